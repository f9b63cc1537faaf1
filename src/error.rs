use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to open {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("malformed xml at byte {position}: {source}")]
    Xml {
        position: usize,
        source: quick_xml::Error,
    },

    #[error("invalid <{element}>: {message}")]
    Parse { element: String, message: String },

    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: quick_xml::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn parse(element: &str, message: impl Into<String>) -> Self {
        Error::Parse {
            element: element.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
