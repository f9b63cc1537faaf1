//! Bounding-box clipping of an [`Osm`] document.
//!
//! The passes run in a fixed order because each one reads the survivor set of the
//! previous pass: nodes, then ways, then relations, then the bounds record.
//! Kept ways and relations are never repaired: a way may still reference nodes
//! that were removed, and a relation keeps all of its members as long as one of
//! them survived.

use std::{collections::HashSet, path::Path, time::Instant};

use log::{debug, info};

use crate::{
    osm_xml, utils::BoundingBox, Bounds, Entity, Error, Member, MemberType, Osm, OsmId, Result,
};

pub const DEFAULT_WAY_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterConfig {
    /// Minimum share of a way's node references that must be inside the box for the way to be kept.
    pub way_threshold: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            way_threshold: DEFAULT_WAY_THRESHOLD,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if (0f64..=1f64).contains(&self.way_threshold) {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "way threshold must be within 0.0..=1.0, got {}",
                self.way_threshold
            )))
        }
    }
}

/// Number of surviving elements per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterReport {
    pub nodes: usize,
    pub ways: usize,
    pub relations: usize,
}

impl std::fmt::Display for FilterReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} nodes, {} ways, {} relations",
            self.nodes, self.ways, self.relations
        )
    }
}

/// Removes every node outside `bbox` and returns the ids of the remaining ones.
pub fn classify_nodes(osm: &mut Osm, bbox: &BoundingBox) -> HashSet<OsmId> {
    osm.children.retain(|child| match child {
        Entity::Node(node) => bbox.contains(node.lat, node.lon),
        _ => true,
    });
    osm.nodes().map(|node| node.id.clone()).collect()
}

/// Removes ways with too few references into `nodes` and returns the ids of the remaining ones.
/// A way without references is always kept. An `nd` without `ref` counts as a reference
/// that never matches.
pub fn classify_ways(osm: &mut Osm, nodes: &HashSet<OsmId>, threshold: f64) -> HashSet<OsmId> {
    osm.children.retain(|child| {
        let Entity::Way(way) = child else {
            return true;
        };
        let total_refs = way.node_refs.len();
        let valid_refs = way
            .node_refs
            .iter()
            .filter(|reference| matches!(reference, Some(id) if nodes.contains(id)))
            .count();
        if valid_refs < total_refs {
            debug!(
                "way {} has {} of {} node references inside",
                way.id, valid_refs, total_refs
            );
        }
        valid_refs as f64 >= total_refs as f64 * threshold
    });
    osm.ways().map(|way| way.id.clone()).collect()
}

fn resolves(member: &Member, nodes: &HashSet<OsmId>, ways: &HashSet<OsmId>) -> bool {
    let survivors = match member.member_type {
        MemberType::Node => nodes,
        MemberType::Way => ways,
        MemberType::Relation | MemberType::Other(_) | MemberType::Missing => return false,
    };
    member
        .member_ref
        .as_ref()
        .is_some_and(|id| survivors.contains(id))
}

/// Removes relations without a single member in `nodes` or `ways`. Member lists are left as they are.
pub fn classify_relations(osm: &mut Osm, nodes: &HashSet<OsmId>, ways: &HashSet<OsmId>) {
    osm.children.retain(|child| match child {
        Entity::Relation(relation) => relation
            .member
            .iter()
            .any(|member| resolves(member, nodes, ways)),
        _ => true,
    });
}

/// Sets every bounds record to exactly `bbox`. A document without one gets a new record
/// as its first child.
pub fn rewrite_bounds(osm: &mut Osm, bbox: &BoundingBox) {
    let mut rewritten = 0;
    for bounds in osm.bounds_mut() {
        bounds.set(bbox);
        rewritten += 1;
    }
    if rewritten == 0 {
        osm.children.insert(0, Entity::Bounds(Bounds::from(bbox)));
    } else if rewritten > 1 {
        debug!("rewrote {} bounds records", rewritten);
    }
}

pub fn filter_osm(osm: &mut Osm, bbox: &BoundingBox, config: &FilterConfig) -> FilterReport {
    let nodes = classify_nodes(osm, bbox);
    info!("nodes inside area: {}", nodes.len());

    let ways = classify_ways(osm, &nodes, config.way_threshold);
    info!("ways inside area: {}", ways.len());

    classify_relations(osm, &nodes, &ways);
    let relations = osm.relations().count();
    info!("relations inside area: {}", relations);

    rewrite_bounds(osm, bbox);

    FilterReport {
        nodes: osm.nodes().count(),
        ways: osm.ways().count(),
        relations,
    }
}

/// Reads `input`, clips it to `bbox` and writes the result to `output`.
pub fn filter_file(
    input: &Path,
    output: &Path,
    bbox: &BoundingBox,
    config: &FilterConfig,
) -> Result<FilterReport> {
    config.validate()?;
    bbox.validate()?;

    let start = Instant::now();
    info!("filtering {:?}, bounding box: {}", input, bbox);

    let mut osm = osm_xml::read_file(input)?;
    info!(
        "parsed {} nodes, {} ways, {} relations in {:?}",
        osm.nodes().count(),
        osm.ways().count(),
        osm.relations().count(),
        start.elapsed()
    );

    let report = filter_osm(&mut osm, bbox, config);
    osm_xml::write_file(&osm, output)?;

    info!("filtered file saved to {:?} in {:?}", output, start.elapsed());
    Ok(report)
}
