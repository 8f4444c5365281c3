//! Candidate mesh selection.
//!
//! Given a start/end coordinate pair and an optional vehicle type, rank the
//! stored meshes that could serve the request. The policy favours freshness
//! over availability: only meshes sharing the most recent creation date
//! survive, ordered smallest-area (most specific) first.

use uuid::Uuid;

use crate::geo::LatLon;
use crate::mesh::{Mesh, MeshStore};

/// Result of mesh selection: an ordered candidate list, best first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshSelection {
    /// Candidate mesh ids, most specific first. Empty means no coverage.
    pub meshes: Vec<Uuid>,
    /// Set when a vehicle type was requested but only environment meshes
    /// qualify; a vehicle mesh must be synthesized before use.
    pub needs_vehicle_synthesis: bool,
}

impl MeshSelection {
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    fn from_candidates(mut candidates: Vec<&Mesh>, needs_vehicle_synthesis: bool) -> Self {
        // Recency: keep only candidates sharing the single most recent
        // creation date. Older qualifying meshes are discarded even if
        // otherwise valid.
        if let Some(latest) = candidates.iter().map(|m| m.created.date_naive()).max() {
            candidates.retain(|m| m.created.date_naive() == latest);
        }

        // Ascending area: the most targeted mesh is attempted first, larger
        // coarser meshes serve as fallbacks.
        candidates.sort_by(|a, b| {
            a.area()
                .partial_cmp(&b.area())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Self {
            meshes: candidates.into_iter().map(|m| m.id).collect(),
            needs_vehicle_synthesis,
        }
    }
}

/// Select and rank meshes whose bounds contain both endpoints.
///
/// An empty selection is a valid result meaning "no coverage"; it is never
/// an error. Coordinates are validated upstream at construction of
/// [`LatLon`], so malformed input cannot reach this function.
pub fn select_candidate_meshes(
    store: &MeshStore,
    start: &LatLon,
    end: &LatLon,
    vehicle_type: Option<&str>,
) -> MeshSelection {
    let containing: Vec<&Mesh> = store
        .all()
        .into_iter()
        .filter(|m| m.contains(start) && m.contains(end))
        .collect();

    if let Some(vessel_type) = vehicle_type {
        let vehicle_meshes: Vec<&Mesh> = containing
            .iter()
            .copied()
            .filter(|m| m.vessel_type() == Some(vessel_type))
            .collect();

        if !vehicle_meshes.is_empty() {
            return MeshSelection::from_candidates(vehicle_meshes, false);
        }

        // No vehicle mesh for this vessel: fall back to environment meshes
        // and signal that synthesis is required before use.
        let environment: Vec<&Mesh> = containing
            .into_iter()
            .filter(|m| m.vessel_type().is_none())
            .collect();
        return MeshSelection::from_candidates(environment, true);
    }

    let environment: Vec<&Mesh> = containing
        .into_iter()
        .filter(|m| m.vessel_type().is_none())
        .collect();
    MeshSelection::from_candidates(environment, false)
}
