//! Vehicle profiles and their in-memory store.
//!
//! A vehicle is a named performance profile used both to select vehicle
//! meshes and to synthesize one from an environment mesh when none exists.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PolarwayError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    /// Unique profile name, e.g. "SDA".
    pub vessel_type: String,
    pub max_speed: f64,
    /// Unit of `max_speed`, e.g. "knots".
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ice_conc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_depth: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wave: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_zones: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beam: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hull_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl Vehicle {
    /// Reject profiles that cannot drive a route computation.
    pub fn validate(&self) -> Result<()> {
        if self.vessel_type.trim().is_empty() {
            return Err(PolarwayError::InvalidVehicle(
                "vessel_type must not be empty".to_string(),
            ));
        }
        if !self.max_speed.is_finite() || self.max_speed <= 0.0 {
            return Err(PolarwayError::InvalidVehicle(format!(
                "max_speed must be positive, got {}",
                self.max_speed
            )));
        }
        if self.unit.trim().is_empty() {
            return Err(PolarwayError::InvalidVehicle(
                "unit must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Vehicle store keyed by vessel type.
///
/// Creation is open; updates require the caller to pass `force`, so
/// operationally significant parameters are never overwritten silently.
#[derive(Debug, Default)]
pub struct VehicleStore {
    vehicles: BTreeMap<String, Vehicle>,
}

impl VehicleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new vehicle or, with `force`, replace an existing one.
    pub fn upsert(&mut self, mut vehicle: Vehicle, force: bool) -> Result<bool> {
        vehicle.validate()?;
        if vehicle.created.is_none() {
            vehicle.created = Some(Utc::now());
        }
        let existed = self.vehicles.contains_key(&vehicle.vessel_type);
        if existed && !force {
            return Err(PolarwayError::VehicleExists(vehicle.vessel_type));
        }
        self.vehicles.insert(vehicle.vessel_type.clone(), vehicle);
        Ok(!existed)
    }

    /// Insert only if absent, used during vehicle-mesh ingestion.
    pub fn get_or_create(&mut self, vehicle: Vehicle) -> Result<&Vehicle> {
        vehicle.validate()?;
        Ok(self
            .vehicles
            .entry(vehicle.vessel_type.clone())
            .or_insert_with(|| Vehicle {
                created: Some(Utc::now()),
                ..vehicle
            }))
    }

    pub fn get(&self, vessel_type: &str) -> Option<&Vehicle> {
        self.vehicles.get(vessel_type)
    }

    pub fn remove(&mut self, vessel_type: &str) -> Option<Vehicle> {
        self.vehicles.remove(vessel_type)
    }

    pub fn all(&self) -> Vec<&Vehicle> {
        self.vehicles.values().collect()
    }

    pub fn vessel_types(&self) -> Vec<String> {
        self.vehicles.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sda() -> Vehicle {
        Vehicle {
            vessel_type: "SDA".to_string(),
            max_speed: 26.5,
            unit: "km/hr".to_string(),
            max_ice_conc: Some(80.0),
            min_depth: Some(10.0),
            max_wave: None,
            excluded_zones: None,
            beam: Some(24.0),
            hull_type: Some("slender".to_string()),
            force_limit: None,
            created: None,
        }
    }

    #[test]
    fn create_and_fetch() {
        let mut store = VehicleStore::new();
        assert!(store.upsert(sda(), false).unwrap());
        let v = store.get("SDA").unwrap();
        assert_eq!(v.max_speed, 26.5);
        assert!(v.created.is_some());
    }

    #[test]
    fn duplicate_rejected_without_force() {
        let mut store = VehicleStore::new();
        store.upsert(sda(), false).unwrap();
        assert!(matches!(
            store.upsert(sda(), false),
            Err(PolarwayError::VehicleExists(_))
        ));
    }

    #[test]
    fn force_overwrites_properties() {
        let mut store = VehicleStore::new();
        store.upsert(sda(), false).unwrap();
        let mut updated = sda();
        updated.max_speed = 20.0;
        assert!(!store.upsert(updated, true).unwrap());
        assert_eq!(store.get("SDA").unwrap().max_speed, 20.0);
    }

    #[test]
    fn invalid_speed_rejected() {
        let mut store = VehicleStore::new();
        let mut v = sda();
        v.max_speed = 0.0;
        assert!(matches!(
            store.upsert(v, false),
            Err(PolarwayError::InvalidVehicle(_))
        ));
    }

    #[test]
    fn get_or_create_keeps_existing() {
        let mut store = VehicleStore::new();
        store.upsert(sda(), false).unwrap();
        let mut other = sda();
        other.max_speed = 99.0;
        let v = store.get_or_create(other).unwrap();
        assert_eq!(v.max_speed, 26.5);
    }

    #[test]
    fn vessel_types_sorted() {
        let mut store = VehicleStore::new();
        let mut b = sda();
        b.vessel_type = "bravo".to_string();
        let mut a = sda();
        a.vessel_type = "alpha".to_string();
        store.upsert(b, false).unwrap();
        store.upsert(a, false).unwrap();
        assert_eq!(store.vessel_types(), vec!["alpha", "bravo"]);
    }
}
