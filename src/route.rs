//! Route records and the cached-result existence check.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::geo::LatLon;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteMetrics {
    pub time_days: f64,
    pub fuel_tonnes: f64,
    pub distance_nm: f64,
}

/// A computed (or in-flight) route. Immutable once calculated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub requested: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculated: Option<DateTime<Utc>>,
    pub start: LatLon,
    pub end: LatLon,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_name: Option<String>,
    /// The mesh the route was (or is being) computed on.
    pub mesh_id: Uuid,
    /// Path geometry as GeoJSON, present once computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RouteMetrics>,
    /// Version of the optimization engine that produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
}

impl Route {
    pub fn new(
        start: LatLon,
        end: LatLon,
        start_name: Option<String>,
        end_name: Option<String>,
        mesh_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            requested: Utc::now(),
            calculated: None,
            start,
            end,
            start_name,
            end_name,
            mesh_id,
            geometry: None,
            metrics: None,
            engine_version: None,
        }
    }

    /// A route is reusable once a computation has produced geometry for it.
    pub fn is_calculated(&self) -> bool {
        self.calculated.is_some() && self.geometry.is_some()
    }
}

#[derive(Debug, Default)]
pub struct RouteStore {
    routes: HashMap<Uuid, Route>,
}

impl RouteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, route: Route) -> Uuid {
        let id = route.id;
        self.routes.insert(id, route);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<&Route> {
        self.routes.get(id)
    }

    /// Record a successful computation result. Returns false for unknown ids.
    pub fn set_result(
        &mut self,
        id: &Uuid,
        geometry: Value,
        metrics: RouteMetrics,
        engine_version: String,
    ) -> bool {
        match self.routes.get_mut(id) {
            Some(route) => {
                route.geometry = Some(geometry);
                route.metrics = Some(metrics);
                route.engine_version = Some(engine_version);
                route.calculated = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Re-point an in-flight route at a fallback mesh.
    pub fn set_mesh(&mut self, id: &Uuid, mesh_id: Uuid) -> bool {
        match self.routes.get_mut(id) {
            Some(route) => {
                route.mesh_id = mesh_id;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<Route> {
        self.routes.remove(id)
    }

    /// Calculated routes on one mesh, for the existence check.
    pub fn calculated_on_mesh(&self, mesh_id: &Uuid) -> Vec<&Route> {
        self.routes
            .values()
            .filter(|r| r.mesh_id == *mesh_id && r.is_calculated())
            .collect()
    }

    /// Routes requested within the trailing window, newest first.
    pub fn recent(&self, window: Duration) -> Vec<&Route> {
        let cutoff = Utc::now() - window;
        let mut recent: Vec<&Route> = self
            .routes
            .values()
            .filter(|r| r.requested >= cutoff)
            .collect();
        recent.sort_by_key(|r| std::cmp::Reverse(r.requested));
        recent
    }
}

/// Look for a previously computed route on `mesh_id` that satisfies the
/// requested endpoints within `tolerance_nm` nautical miles (haversine, on
/// both the start and the end point).
///
/// Pure lookup: no side effects. Freshness is the caller's concern — pass
/// meshes in selector priority order and the most-recent-mesh rule holds by
/// construction.
pub fn find_existing_route(
    routes: &RouteStore,
    mesh_id: &Uuid,
    start: &LatLon,
    end: &LatLon,
    tolerance_nm: f64,
) -> Option<Uuid> {
    let candidates = routes.calculated_on_mesh(mesh_id);

    // Exact coordinate match wins outright.
    if let Some(exact) = candidates
        .iter()
        .find(|r| r.start == *start && r.end == *end)
    {
        return Some(exact.id);
    }

    // Otherwise the closest route with both endpoints inside tolerance.
    candidates
        .into_iter()
        .filter_map(|r| {
            let ds = start.haversine_nm(&r.start);
            let de = end.haversine_nm(&r.end);
            (ds <= tolerance_nm && de <= tolerance_nm).then_some((r.id, ds + de))
        })
        .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(id, _)| id)
}

/// Walk an ordered candidate mesh list and return the first reusable route.
pub fn find_existing_route_on_any(
    routes: &RouteStore,
    mesh_ids: &[Uuid],
    start: &LatLon,
    end: &LatLon,
    tolerance_nm: f64,
) -> Option<Uuid> {
    mesh_ids
        .iter()
        .find_map(|mesh_id| find_existing_route(routes, mesh_id, start, end, tolerance_nm))
}
