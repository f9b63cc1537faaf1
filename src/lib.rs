pub mod error;
pub mod features;
pub mod filter;
pub mod osm_xml;
pub mod utils;

pub use error::{Error, Result};

use crate::utils::BoundingBox;

/// Attributes in the order they appeared in the source document.
pub type Attributes = Vec<(String, String)>;

/// Element id exactly as written in the document. References resolve by text, so
/// `ref="08"` does not point at `id="8"`.
pub type OsmId = String;

/// An element the filter does not interpret, kept so it can be written back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Attributes,
    pub children: Vec<Content>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Element(Element),
    Text(String),
}

impl Element {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        find_attribute(&self.attributes, key)
    }
}

pub(crate) fn find_attribute<'a>(attributes: &'a Attributes, key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn tags(children: &[Content]) -> impl Iterator<Item = (&str, &str)> {
    children.iter().filter_map(|child| match child {
        Content::Element(element) if element.name == "tag" => {
            Some((element.attribute("k")?, element.attribute("v")?))
        }
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: OsmId,
    pub lat: f64,
    pub lon: f64,
    pub attributes: Attributes,
    pub children: Vec<Content>,
}

impl Node {
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        tags(&self.children)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub id: OsmId,
    /// One entry per `nd` child, in order; `None` when the `nd` has no `ref`.
    /// The children themselves stay in `children`.
    pub node_refs: Vec<Option<OsmId>>,
    pub attributes: Attributes,
    pub children: Vec<Content>,
}

impl Way {
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        tags(&self.children)
    }

    pub fn is_closed(&self) -> bool {
        self.node_refs.len() >= 4
            && self.node_refs.first().is_some_and(Option::is_some)
            && self.node_refs.first() == self.node_refs.last()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberType {
    Node,
    Way,
    Relation,
    Other(String),
    /// The member has no `type` attribute.
    Missing,
}

impl From<Option<&str>> for MemberType {
    fn from(value: Option<&str>) -> Self {
        match value {
            Some("node") => MemberType::Node,
            Some("way") => MemberType::Way,
            Some("relation") => MemberType::Relation,
            Some(other) => MemberType::Other(other.to_string()),
            None => MemberType::Missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub member_type: MemberType,
    pub member_ref: Option<OsmId>,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub id: OsmId,
    pub member: Vec<Member>,
    pub attributes: Attributes,
    pub children: Vec<Content>,
}

impl Relation {
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        tags(&self.children)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
    pub attributes: Attributes,
}

impl Bounds {
    /// Overwrites the four edges with `bbox`, keeping the position of existing attributes.
    pub fn set(&mut self, bbox: &BoundingBox) {
        self.min_lat = bbox.min_lat;
        self.min_lon = bbox.min_lon;
        self.max_lat = bbox.max_lat;
        self.max_lon = bbox.max_lon;

        for (key, value) in [
            ("minlat", bbox.min_lat),
            ("minlon", bbox.min_lon),
            ("maxlat", bbox.max_lat),
            ("maxlon", bbox.max_lon),
        ] {
            match self.attributes.iter_mut().find(|(k, _)| k == key) {
                Some((_, v)) => *v = value.to_string(),
                None => self.attributes.push((key.to_string(), value.to_string())),
            }
        }
    }

    pub fn to_bbox(&self) -> BoundingBox {
        BoundingBox::new(self.min_lon, self.max_lon, self.min_lat, self.max_lat)
    }
}

impl From<&BoundingBox> for Bounds {
    fn from(bbox: &BoundingBox) -> Self {
        let mut bounds = Bounds {
            min_lat: bbox.min_lat,
            min_lon: bbox.min_lon,
            max_lat: bbox.max_lat,
            max_lon: bbox.max_lon,
            attributes: Attributes::new(),
        };
        bounds.set(bbox);
        bounds
    }
}

/// A child of the `osm` root element.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Bounds(Bounds),
    Node(Node),
    Way(Way),
    Relation(Relation),
    /// `note`, `meta` and anything else the filter does not interpret.
    Other(Content),
}

/// A whole map document held in memory, root children in document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Osm {
    /// Attributes of the `osm` root element.
    pub attributes: Attributes,
    pub children: Vec<Entity>,
}

impl Osm {
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter_map(|child| match child {
            Entity::Node(node) => Some(node),
            _ => None,
        })
    }

    pub fn ways(&self) -> impl Iterator<Item = &Way> {
        self.children.iter().filter_map(|child| match child {
            Entity::Way(way) => Some(way),
            _ => None,
        })
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.children.iter().filter_map(|child| match child {
            Entity::Relation(relation) => Some(relation),
            _ => None,
        })
    }

    /// The first `bounds` record, if any.
    pub fn bounds(&self) -> Option<&Bounds> {
        self.children.iter().find_map(|child| match child {
            Entity::Bounds(bounds) => Some(bounds),
            _ => None,
        })
    }

    pub fn bounds_mut(&mut self) -> impl Iterator<Item = &mut Bounds> {
        self.children.iter_mut().filter_map(|child| match child {
            Entity::Bounds(bounds) => Some(bounds),
            _ => None,
        })
    }
}
