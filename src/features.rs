use std::collections::HashMap;

use geo::{Area, Coord, LineString, Polygon};
use serde_json::{json, Map, Value};

use crate::{Osm, OsmId, Way};

type NodeToCoord<'a> = HashMap<&'a OsmId, Coord<f64>>;

/// Closed ways whose every node is present in `osm`, as polygons in lon/lat order.
/// Rings that enclose no area are skipped.
pub fn area_polygons(osm: &Osm) -> Vec<(&Way, Polygon<f64>)> {
    let node_to_coord: NodeToCoord = osm.nodes().fold(NodeToCoord::new(), |mut acc, node| {
        acc.insert(&node.id, Coord { x: node.lon, y: node.lat });
        acc
    });

    osm.ways()
        .filter(|way| way.is_closed())
        .filter_map(|way| {
            let ring: Option<Vec<Coord<f64>>> = way
                .node_refs
                .iter()
                .map(|reference| node_to_coord.get(reference.as_ref()?).copied())
                .collect();
            let polygon = Polygon::new(LineString::from(ring?), vec![]);
            (polygon.unsigned_area() > 0f64).then_some((way, polygon))
        })
        .collect()
}

/// GeoJSON `FeatureCollection` of [`area_polygons`], tagged with the way's tags and `osm_id`.
pub fn area_feature_collection(osm: &Osm) -> Value {
    let features: Vec<Value> = area_polygons(osm)
        .into_iter()
        .map(|(way, polygon)| {
            let mut properties: Map<String, Value> = way
                .tags()
                .map(|(k, v)| (k.to_string(), Value::from(v)))
                .collect();
            properties.insert("osm_id".to_string(), Value::from(way.id.as_str()));

            let ring: Vec<[f64; 2]> = polygon
                .exterior()
                .coords()
                .map(|coord| [coord.x, coord.y])
                .collect();
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [ring],
                },
                "properties": properties,
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}
