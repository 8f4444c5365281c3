//! Seam to the external route-optimization engine.
//!
//! The server never implements route optimization itself; workers call
//! through [`RouteOptimizer`]. The trait also covers vehicle-mesh synthesis,
//! since both operations belong to the same external engine.

use serde_json::{json, Value};
use thiserror::Error;

use crate::geo::LatLon;
use crate::mesh::Mesh;
use crate::route::RouteMetrics;
use crate::vehicle::Vehicle;

/// Failure classes of one optimization attempt. Only [`Inaccessible`] is
/// recoverable by retrying on a fallback mesh.
///
/// [`Inaccessible`]: OptimizeError::Inaccessible
#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("No accessible path between endpoints on this mesh: {0}")]
    Inaccessible(String),

    #[error("Route computation failed: {0}")]
    Computation(String),
}

/// Output of a successful optimization.
#[derive(Debug, Clone)]
pub struct ComputedRoute {
    pub geometry: Value,
    pub metrics: RouteMetrics,
    pub engine_version: String,
}

/// Interface the worker pool needs from the optimization engine.
///
/// Implementations may block; workers run them on the blocking thread pool.
pub trait RouteOptimizer: Send + Sync {
    /// Compute an optimal route between `start` and `end` on `mesh`.
    fn optimize(
        &self,
        mesh: &Mesh,
        start: &LatLon,
        end: &LatLon,
        vehicle: Option<&Vehicle>,
    ) -> Result<ComputedRoute, OptimizeError>;

    /// Derive a vehicle mesh payload from an environment mesh and a vehicle
    /// profile.
    fn build_vehicle_mesh(&self, env_mesh: &Mesh, vehicle: &Vehicle)
        -> Result<Value, OptimizeError>;

    /// Version string recorded on produced routes.
    fn version(&self) -> &str;
}

/// Built-in estimator used when no external engine is wired in: produces the
/// great-circle path with time and fuel estimated from the vehicle profile.
/// Good enough for demos and smoke tests, not for navigation.
#[derive(Debug, Default)]
pub struct GreatCircleEstimator;

impl GreatCircleEstimator {
    const VERSION: &'static str = "great-circle/0.3.0";
    /// Fallback cruise speed in knots when no vehicle profile is supplied.
    const DEFAULT_SPEED_KN: f64 = 12.0;
    /// Crude fuel burn estimate, tonnes per day underway.
    const FUEL_TONNES_PER_DAY: f64 = 5.5;
}

impl RouteOptimizer for GreatCircleEstimator {
    fn optimize(
        &self,
        mesh: &Mesh,
        start: &LatLon,
        end: &LatLon,
        vehicle: Option<&Vehicle>,
    ) -> Result<ComputedRoute, OptimizeError> {
        if !mesh.contains(start) || !mesh.contains(end) {
            return Err(OptimizeError::Inaccessible(format!(
                "endpoints {start} -> {end} fall outside mesh bounds"
            )));
        }

        let distance_nm = start.haversine_nm(end);
        let speed_kn = vehicle.map_or(Self::DEFAULT_SPEED_KN, |v| v.max_speed);
        let time_days = distance_nm / speed_kn / 24.0;

        let geometry = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {
                    "from": "Start",
                    "to": "End",
                    "traveltime_days": time_days,
                    "distance_nm": distance_nm,
                },
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[start.lon, start.lat], [end.lon, end.lat]],
                }
            }]
        });

        Ok(ComputedRoute {
            geometry,
            metrics: RouteMetrics {
                time_days,
                fuel_tonnes: time_days * Self::FUEL_TONNES_PER_DAY,
                distance_nm,
            },
            engine_version: Self::VERSION.to_string(),
        })
    }

    fn build_vehicle_mesh(
        &self,
        env_mesh: &Mesh,
        vehicle: &Vehicle,
    ) -> Result<Value, OptimizeError> {
        let mut json = env_mesh.json.clone();
        let vessel_info = serde_json::to_value(vehicle)
            .map_err(|e| OptimizeError::Computation(format!("vehicle serialization: {e}")))?;
        match json.get_mut("config") {
            Some(Value::Object(config)) => {
                config.insert("vessel_info".to_string(), vessel_info);
            }
            _ => {
                json = json!({"config": {"vessel_info": vessel_info}});
            }
        }
        Ok(json)
    }

    fn version(&self) -> &str {
        Self::VERSION
    }
}
