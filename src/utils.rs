use crate::{Error, Result};

pub const EARTH_RADIUS_METERS: f64 = 6_371_000f64;

/// Clip rectangle in WGS84 degrees. Every edge is inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Self {
        BoundingBox {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    /// An inverted box (min greater than max) is accepted and simply contains nothing.
    pub fn validate(&self) -> Result<()> {
        let edges = [self.min_lon, self.max_lon, self.min_lat, self.max_lat];
        if edges.iter().all(|edge| edge.is_finite()) {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "bounding box edges must be finite numbers, got {}",
                self
            )))
        }
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.min_lat <= lat && lat <= self.max_lat && self.min_lon <= lon && lon <= self.max_lon
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lon[{}, {}], lat[{}, {}]",
            self.min_lon, self.max_lon, self.min_lat, self.max_lat
        )
    }
}

/// Great-circle distance in meters between two WGS84 points.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2f64).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2f64).sin().powi(2);
    let c = 2f64 * a.sqrt().atan2((1f64 - a).sqrt());

    EARTH_RADIUS_METERS * c
}
