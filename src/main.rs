use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{
    routing::{get, post},
    Extension, Json, Router,
};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use osm_clip::{features::area_feature_collection, osm_xml, utils::haversine_distance, Osm};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

/// Serves a filtered map document and a distance calculator over HTTP.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Filtered OSM XML document to serve
    #[arg(long, env = "OSM_CLIP_OSM", default_value = "map_filtered.osm")]
    osm: PathBuf,

    /// Port to listen on
    #[arg(long, env = "OSM_CLIP_PORT", default_value_t = 5000)]
    port: u16,
}

#[derive(Serialize)]
struct MapBounds {
    min_lon: f64,
    max_lon: f64,
    min_lat: f64,
    max_lat: f64,
}

async fn map_data(Extension(osm): Extension<Arc<Osm>>) -> Json<Value> {
    let collection = area_feature_collection(&osm);
    let has_areas = collection["features"]
        .as_array()
        .is_some_and(|features| !features.is_empty());

    match (osm.bounds(), has_areas) {
        (Some(bounds), true) => Json(json!({
            "status": "success",
            "data": collection,
            "bounds": MapBounds {
                min_lon: bounds.min_lon,
                max_lon: bounds.max_lon,
                min_lat: bounds.min_lat,
                max_lat: bounds.max_lat,
            },
        })),
        _ => Json(json!({
            "status": "error",
            "message": "map document has no bounds or no areas to show",
        })),
    }
}

/// Accepts numbers as well as numeric strings.
fn coordinate(data: &Value, key: &str) -> Result<f64, String> {
    match &data[key] {
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| format!("`{}` is not a finite number", key)),
        Value::String(text) => text
            .trim()
            .parse()
            .map_err(|_| format!("`{}` is not a number: {:?}", key, text)),
        Value::Null => Err(format!("missing `{}`", key)),
        other => Err(format!("`{}` is not a number: {}", key, other)),
    }
}

fn distance_between(data: &Value) -> Result<f64, String> {
    Ok(haversine_distance(
        coordinate(data, "lat1")?,
        coordinate(data, "lon1")?,
        coordinate(data, "lat2")?,
        coordinate(data, "lon2")?,
    ))
}

async fn calculate_distance(payload: Option<Json<Value>>) -> Json<Value> {
    let Some(Json(data)) = payload else {
        return Json(json!({
            "status": "error",
            "message": "no data provided",
        }));
    };

    match distance_between(&data) {
        Ok(distance) => Json(json!({
            "status": "success",
            "distance_meters": (distance * 100f64).round() / 100f64,
            "distance_km": distance.round() / 1000f64,
        })),
        Err(message) => {
            warn!("rejected distance request: {}", message);
            Json(json!({
                "status": "error",
                "message": message,
            }))
        }
    }
}

fn router(osm: Arc<Osm>) -> Router {
    Router::new()
        .route("/api/map-data", get(map_data))
        .route("/api/calculate-distance", post(calculate_distance))
        .layer(CorsLayer::permissive())
        .layer(Extension(osm))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    info!("loading map data from {:?}", cli.osm);
    let osm = osm_xml::read_file(&cli.osm)
        .with_context(|| format!("could not load map data from {:?}", cli.osm))?;
    info!(
        "loaded {} nodes, {} ways, {} relations",
        osm.nodes().count(),
        osm.ways().count(),
        osm.relations().count()
    );

    let address = SocketAddr::from(([0, 0, 0, 0], cli.port));
    info!("listening on http://{}", address);
    axum::Server::bind(&address)
        .serve(router(Arc::new(osm)).into_make_service())
        .await
        .context("server stopped with an error")?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    const PARK: &str = r#"<osm>
  <bounds minlat="-1.52" minlon="-48.47" maxlat="-1.47" maxlon="-48.43"/>
  <node id="1" lat="-1.50" lon="-48.46"/>
  <node id="2" lat="-1.50" lon="-48.45"/>
  <node id="3" lat="-1.49" lon="-48.45"/>
  <way id="10">
    <nd ref="1"/><nd ref="2"/><nd ref="3"/><nd ref="1"/>
    <tag k="leisure" v="park"/>
  </way>
</osm>"#;

    #[tokio::test]
    async fn distance_in_meters_and_kilometers() {
        let Json(body) = calculate_distance(Some(Json(json!({
            "lat1": 0.0,
            "lon1": 0.0,
            "lat2": "0.0",
            "lon2": 1,
        }))))
        .await;

        assert_eq!(body["status"], "success");
        assert_eq!(body["distance_meters"], 111194.93);
        assert_eq!(body["distance_km"], 111.195);
    }

    #[tokio::test]
    async fn distance_without_body_is_an_error() {
        let Json(body) = calculate_distance(None).await;
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn distance_with_bad_coordinate_is_an_error() {
        let Json(body) = calculate_distance(Some(Json(json!({
            "lat1": "north",
            "lon1": 0.0,
            "lat2": 0.0,
        }))))
        .await;

        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("lat1"));
    }

    #[tokio::test]
    async fn map_data_returns_areas_and_bounds() {
        let osm = osm_xml::from_reader(PARK.as_bytes()).unwrap();
        let Json(body) = map_data(Extension(Arc::new(osm))).await;

        assert_eq!(body["status"], "success");
        assert_eq!(body["bounds"]["min_lon"], -48.47);
        assert_eq!(body["bounds"]["max_lat"], -1.47);
        assert_eq!(body["data"]["features"][0]["properties"]["leisure"], "park");
    }

    #[tokio::test]
    async fn map_data_without_areas_is_an_error() {
        let Json(body) = map_data(Extension(Arc::new(Osm::default()))).await;
        assert_eq!(body["status"], "error");
    }
}
