//! Mesh ingestion.
//!
//! Both the manual `insert-mesh` command, the mesh upload endpoint and the
//! periodic directory scanner funnel through [`ingest_mesh`]. The mesh type
//! (environment vs vehicle) is detected from the embedded `vessel_info`
//! configuration, and unknown vessel types are created on the fly.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{PolarwayError, Result};
use crate::mesh::{Mesh, MeshKind, MeshStore};
use crate::vehicle::{Vehicle, VehicleStore};

/// Outcome of one ingestion call.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub mesh_id: Uuid,
    /// False when an identical mesh (same fingerprint) was already stored.
    pub created: bool,
    pub kind: MeshKind,
}

/// SHA-256 fingerprint of a mesh payload, hex encoded.
pub fn fingerprint(json: &Value) -> String {
    let mut hasher = Sha256::new();
    // String keys serialize in map order; serde_json preserves insertion
    // order, so identical source files fingerprint identically.
    hasher.update(json.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn region_f64(region: &Value, key: &str) -> Result<f64> {
    region
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| PolarwayError::InvalidMesh(format!("region missing numeric '{key}'")))
}

fn region_date(region: &Value, key: &str) -> Result<NaiveDate> {
    let raw = region
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| PolarwayError::InvalidMesh(format!("region missing '{key}'")))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| PolarwayError::InvalidMesh(format!("bad date in '{key}': {e}")))
}

fn vehicle_from_vessel_info(info: &Value) -> Result<Vehicle> {
    let vessel_type = info
        .get("vessel_type")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PolarwayError::InvalidMesh("vessel_info present but no vessel_type".to_string())
        })?
        .to_string();
    let max_speed = info.get("max_speed").and_then(Value::as_f64).ok_or_else(|| {
        PolarwayError::InvalidMesh(format!("vessel '{vessel_type}' missing max_speed"))
    })?;
    let unit = info
        .get("unit")
        .and_then(Value::as_str)
        .ok_or_else(|| PolarwayError::InvalidMesh(format!("vessel '{vessel_type}' missing unit")))?
        .to_string();

    Ok(Vehicle {
        vessel_type,
        max_speed,
        unit,
        max_ice_conc: info.get("max_ice_conc").and_then(Value::as_f64),
        min_depth: info.get("min_depth").and_then(Value::as_f64),
        max_wave: info.get("max_wave").and_then(Value::as_f64),
        excluded_zones: info.get("excluded_zones").cloned(),
        beam: info.get("beam").and_then(Value::as_f64),
        hull_type: info
            .get("hull_type")
            .and_then(Value::as_str)
            .map(str::to_string),
        force_limit: info.get("force_limit").and_then(Value::as_f64),
        created: None,
    })
}

/// Ingest one mesh payload, creating mesh and (if needed) vehicle records.
pub fn ingest_mesh(
    meshes: &mut MeshStore,
    vehicles: &mut VehicleStore,
    json: Value,
    name: &str,
    created: Option<DateTime<Utc>>,
) -> Result<IngestOutcome> {
    let fingerprint = fingerprint(&json);
    if let Some(existing) = meshes.find_by_fingerprint(&fingerprint) {
        tracing::debug!(mesh_id = %existing.id, name, "Mesh already ingested, skipping");
        return Ok(IngestOutcome {
            mesh_id: existing.id,
            created: false,
            kind: existing.kind.clone(),
        });
    }

    let config = json
        .get("config")
        .ok_or_else(|| PolarwayError::InvalidMesh("missing 'config'".to_string()))?;
    let region = config
        .get("mesh_info")
        .and_then(|m| m.get("region"))
        .ok_or_else(|| PolarwayError::InvalidMesh("missing 'config.mesh_info.region'".to_string()))?;

    let lat_min = region_f64(region, "lat_min")?;
    let lat_max = region_f64(region, "lat_max")?;
    let lon_min = region_f64(region, "long_min")?;
    let lon_max = region_f64(region, "long_max")?;
    if lat_min > lat_max || lon_min > lon_max {
        return Err(PolarwayError::InvalidMesh(format!(
            "inverted region bounds: lat [{lat_min}, {lat_max}], lon [{lon_min}, {lon_max}]"
        )));
    }
    let valid_date_start = region_date(region, "start_time")?;
    let valid_date_end = region_date(region, "end_time")?;

    let generator_version = config
        .get("mesh_info")
        .and_then(|m| m.get("version"))
        .and_then(Value::as_str)
        .map(str::to_string);

    // A mesh carrying vessel configuration is a vehicle mesh; make sure the
    // vehicle itself exists.
    let kind = match config.get("vessel_info") {
        Some(info) => {
            let vehicle = vehicle_from_vessel_info(info)?;
            let vessel_type = vehicle.vessel_type.clone();
            vehicles.get_or_create(vehicle)?;
            MeshKind::Vehicle { vessel_type }
        }
        None => MeshKind::Environment,
    };

    let mesh = Mesh {
        id: Uuid::new_v4(),
        name: name.to_string(),
        fingerprint,
        created: created.unwrap_or_else(Utc::now),
        valid_date_start,
        valid_date_end,
        lat_min,
        lat_max,
        lon_min,
        lon_max,
        json,
        generator_version,
        kind: kind.clone(),
        environment_mesh: None,
    };

    let (mesh_id, created) = meshes.insert(mesh);
    if created {
        tracing::info!(mesh_id = %mesh_id, name, kind = ?kind, "New mesh ingested");
    }
    Ok(IngestOutcome {
        mesh_id,
        created,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env_mesh_json() -> Value {
        json!({
            "config": {
                "mesh_info": {
                    "version": "2.1.13",
                    "region": {
                        "lat_min": -65.0, "lat_max": -40.0,
                        "long_min": -70.0, "long_max": -30.0,
                        "start_time": "2024-01-01", "end_time": "2024-01-03"
                    }
                }
            },
            "cellboxes": []
        })
    }

    fn vehicle_mesh_json() -> Value {
        let mut v = env_mesh_json();
        v["config"]["vessel_info"] = json!({
            "vessel_type": "SDA",
            "max_speed": 26.5,
            "unit": "km/hr",
            "beam": 24.0
        });
        v
    }

    #[test]
    fn ingests_environment_mesh() {
        let mut meshes = MeshStore::new();
        let mut vehicles = VehicleStore::new();
        let out =
            ingest_mesh(&mut meshes, &mut vehicles, env_mesh_json(), "south.json", None).unwrap();
        assert!(out.created);
        assert_eq!(out.kind, MeshKind::Environment);

        let m = meshes.get(&out.mesh_id).unwrap();
        assert_eq!(m.lat_min, -65.0);
        assert_eq!(m.lon_max, -30.0);
        assert_eq!(m.generator_version.as_deref(), Some("2.1.13"));
        assert_eq!(m.valid_date_start.to_string(), "2024-01-01");
    }

    #[test]
    fn reingest_is_idempotent() {
        let mut meshes = MeshStore::new();
        let mut vehicles = VehicleStore::new();
        let a = ingest_mesh(&mut meshes, &mut vehicles, env_mesh_json(), "a.json", None).unwrap();
        let b = ingest_mesh(&mut meshes, &mut vehicles, env_mesh_json(), "b.json", None).unwrap();
        assert!(a.created);
        assert!(!b.created);
        assert_eq!(a.mesh_id, b.mesh_id);
        assert_eq!(meshes.len(), 1);
    }

    #[test]
    fn vehicle_mesh_creates_missing_vehicle() {
        let mut meshes = MeshStore::new();
        let mut vehicles = VehicleStore::new();
        let out = ingest_mesh(
            &mut meshes,
            &mut vehicles,
            vehicle_mesh_json(),
            "sda.json",
            None,
        )
        .unwrap();
        assert_eq!(
            out.kind,
            MeshKind::Vehicle {
                vessel_type: "SDA".to_string()
            }
        );
        let v = vehicles.get("SDA").unwrap();
        assert_eq!(v.max_speed, 26.5);
        assert_eq!(v.beam, Some(24.0));
    }

    #[test]
    fn existing_vehicle_not_overwritten() {
        let mut meshes = MeshStore::new();
        let mut vehicles = VehicleStore::new();
        vehicles
            .upsert(
                Vehicle {
                    vessel_type: "SDA".to_string(),
                    max_speed: 20.0,
                    unit: "knots".to_string(),
                    max_ice_conc: None,
                    min_depth: None,
                    max_wave: None,
                    excluded_zones: None,
                    beam: None,
                    hull_type: None,
                    force_limit: None,
                    created: None,
                },
                false,
            )
            .unwrap();

        ingest_mesh(
            &mut meshes,
            &mut vehicles,
            vehicle_mesh_json(),
            "sda.json",
            None,
        )
        .unwrap();
        // Profile from the database wins over the one embedded in the mesh.
        assert_eq!(vehicles.get("SDA").unwrap().max_speed, 20.0);
    }

    #[test]
    fn rejects_missing_region() {
        let mut meshes = MeshStore::new();
        let mut vehicles = VehicleStore::new();
        let err = ingest_mesh(
            &mut meshes,
            &mut vehicles,
            json!({"config": {}}),
            "bad.json",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PolarwayError::InvalidMesh(_)));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let mut json = env_mesh_json();
        json["config"]["mesh_info"]["region"]["lat_min"] = serde_json::json!(-30.0);
        let mut meshes = MeshStore::new();
        let mut vehicles = VehicleStore::new();
        assert!(ingest_mesh(&mut meshes, &mut vehicles, json, "bad.json", None).is_err());
    }
}
