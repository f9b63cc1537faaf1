use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use osm_clip::{
    filter::{filter_file, FilterConfig, DEFAULT_WAY_THRESHOLD},
    utils::BoundingBox,
};

/// Clips an OSM XML document to a bounding box.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input OSM XML file
    #[arg(short, long, env = "OSM_CLIP_INPUT")]
    input: PathBuf,

    /// Output OSM XML file
    #[arg(short, long, env = "OSM_CLIP_OUTPUT")]
    output: PathBuf,

    #[arg(long, env = "OSM_CLIP_MIN_LON", allow_negative_numbers = true)]
    min_lon: f64,

    #[arg(long, env = "OSM_CLIP_MAX_LON", allow_negative_numbers = true)]
    max_lon: f64,

    #[arg(long, env = "OSM_CLIP_MIN_LAT", allow_negative_numbers = true)]
    min_lat: f64,

    #[arg(long, env = "OSM_CLIP_MAX_LAT", allow_negative_numbers = true)]
    max_lat: f64,

    /// Share of a way's nodes that must fall inside the box for the way to be kept
    #[arg(long, env = "OSM_CLIP_WAY_THRESHOLD", default_value_t = DEFAULT_WAY_THRESHOLD)]
    way_threshold: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let bbox = BoundingBox::new(cli.min_lon, cli.max_lon, cli.min_lat, cli.max_lat);
    let config = FilterConfig {
        way_threshold: cli.way_threshold,
    };

    let report = filter_file(&cli.input, &cli.output, &bbox, &config)
        .with_context(|| format!("could not filter {:?}", cli.input))?;

    println!("{}", report);
    Ok(())
}
