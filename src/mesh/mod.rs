//! Mesh records and the in-memory mesh store.
//!
//! A mesh is a discretized geospatial coverage region produced by an external
//! mesh generator. This crate never inspects cell data; it tracks the
//! bounding box, creation time and content fingerprint needed for candidate
//! selection and result caching.

pub mod ingest;
pub mod scan;
pub mod select;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::geo::LatLon;

pub use ingest::ingest_mesh;
pub use select::{select_candidate_meshes, MeshSelection};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshKind {
    /// Environmental data only; usable for any vehicle after synthesis.
    Environment,
    /// Environment data augmented with one vehicle's performance profile.
    Vehicle { vessel_type: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mesh {
    pub id: Uuid,
    pub name: String,
    /// SHA-256 of the source JSON, used for de-duplication on ingestion.
    pub fingerprint: String,
    pub created: DateTime<Utc>,
    pub valid_date_start: NaiveDate,
    pub valid_date_end: NaiveDate,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
    /// Full mesh payload, passed through to the optimization engine.
    pub json: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_version: Option<String>,
    pub kind: MeshKind,
    /// For a vehicle mesh, the environment mesh it was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_mesh: Option<Uuid>,
}

impl Mesh {
    /// Size metric used for ordering candidates: bounding-box area in
    /// square degrees. Smaller means more specific.
    pub fn area(&self) -> f64 {
        (self.lat_max - self.lat_min).abs() * (self.lon_max - self.lon_min).abs()
    }

    pub fn contains(&self, point: &LatLon) -> bool {
        self.lat_min <= point.lat
            && point.lat <= self.lat_max
            && self.lon_min <= point.lon
            && point.lon <= self.lon_max
    }

    pub fn vessel_type(&self) -> Option<&str> {
        match &self.kind {
            MeshKind::Environment => None,
            MeshKind::Vehicle { vessel_type } => Some(vessel_type),
        }
    }
}

/// In-memory mesh store. Records are immutable once inserted and removed
/// only by explicit administrative action.
#[derive(Debug, Default)]
pub struct MeshStore {
    meshes: HashMap<Uuid, Mesh>,
}

impl MeshStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mesh, de-duplicating on fingerprint. Returns the stored id
    /// and whether a new record was created.
    pub fn insert(&mut self, mesh: Mesh) -> (Uuid, bool) {
        if let Some(existing) = self.find_by_fingerprint(&mesh.fingerprint) {
            return (existing.id, false);
        }
        let id = mesh.id;
        self.meshes.insert(id, mesh);
        (id, true)
    }

    pub fn get(&self, id: &Uuid) -> Option<&Mesh> {
        self.meshes.get(id)
    }

    pub fn find_by_fingerprint(&self, fingerprint: &str) -> Option<&Mesh> {
        self.meshes.values().find(|m| m.fingerprint == fingerprint)
    }

    /// Find an existing vehicle mesh derived from the given environment mesh.
    pub fn vehicle_mesh_for(&self, environment_mesh: &Uuid, vessel_type: &str) -> Option<&Mesh> {
        self.meshes.values().find(|m| {
            m.environment_mesh.as_ref() == Some(environment_mesh)
                && m.vessel_type() == Some(vessel_type)
        })
    }

    pub fn all(&self) -> Vec<&Mesh> {
        self.meshes.values().collect()
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<Mesh> {
        self.meshes.remove(id)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}
