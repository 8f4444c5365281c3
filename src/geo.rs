//! Geographic primitives shared across mesh selection and route caching.

use serde::{Deserialize, Serialize};

use crate::error::{PolarwayError, Result};

/// Mean Earth radius in nautical miles.
const EARTH_RADIUS_NM: f64 = 3440.065;

/// A validated latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    /// Build a coordinate pair, rejecting out-of-range or non-finite values.
    ///
    /// Validation happens here, at the request boundary, so downstream
    /// components never see a malformed coordinate.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(PolarwayError::InvalidCoordinates(format!(
                "coordinates must be finite, got ({lat}, {lon})"
            )));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(PolarwayError::InvalidCoordinates(format!(
                "latitude {lat} outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(PolarwayError::InvalidCoordinates(format!(
                "longitude {lon} outside [-180, 180]"
            )));
        }
        Ok(Self { lat, lon })
    }

    /// Great-circle distance to `other` in nautical miles.
    pub fn haversine_nm(&self, other: &LatLon) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();
        EARTH_RADIUS_NM * c
    }
}

impl std::fmt::Display for LatLon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lon)
    }
}
