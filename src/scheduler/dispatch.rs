//! Request intake: mesh selection, cached-result reuse and job creation.

use async_channel::Sender;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{PolarwayError, Result};
use crate::geo::LatLon;
use crate::mesh::select_candidate_meshes;
use crate::route::{find_existing_route_on_any, Route};
use crate::state::Stores;

use super::job::{Job, JobTask};

/// A validated route request ready for dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRequest {
    pub start: LatLon,
    pub end: LatLon,
    #[serde(default)]
    pub start_name: Option<String>,
    #[serde(default)]
    pub end_name: Option<String>,
    #[serde(default)]
    pub vehicle_type: Option<String>,
    /// Pin the computation to one specific mesh, bypassing selection and
    /// the cached-result check.
    #[serde(default)]
    pub mesh_id: Option<Uuid>,
    /// Recompute even when a cached route satisfies the request.
    #[serde(default)]
    pub force_recalculate: bool,
}

/// What submitting a request produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A cached route satisfies the request; no work enqueued.
    Existing { job_id: Uuid, route_id: Uuid },
    /// A new job was created and queued.
    Queued { job_id: Uuid },
    /// No stored mesh covers both endpoints.
    NoCoverage,
}

/// Turns validated requests into queued jobs.
pub struct Dispatcher {
    stores: Stores,
    tolerance_nm: f64,
    queue: Sender<JobTask>,
}

impl Dispatcher {
    pub fn new(stores: Stores, tolerance_nm: f64, queue: Sender<JobTask>) -> Self {
        Self {
            stores,
            tolerance_nm,
            queue,
        }
    }

    /// Submit a route request.
    ///
    /// With an explicit `mesh_id` the request always computes fresh on that
    /// mesh, with no fallbacks. Otherwise candidate meshes are selected and
    /// an existing route within tolerance is reused unless
    /// `force_recalculate` is set.
    pub async fn submit(&self, request: RouteRequest) -> Result<Submission> {
        if let Some(vessel_type) = request.vehicle_type.as_deref() {
            if self.stores.vehicles.read().await.get(vessel_type).is_none() {
                return Err(PolarwayError::not_found("Vehicle", vessel_type));
            }
        }

        let (candidates, needs_vehicle_synthesis) = match request.mesh_id {
            Some(mesh_id) => {
                let meshes = self.stores.meshes.read().await;
                let mesh = meshes
                    .get(&mesh_id)
                    .ok_or_else(|| PolarwayError::not_found("Mesh", mesh_id))?;
                // A pinned environment mesh still needs synthesis when the
                // request names a vehicle.
                let synthesize =
                    request.vehicle_type.is_some() && mesh.vessel_type().is_none();
                (vec![mesh_id], synthesize)
            }
            None => {
                let meshes = self.stores.meshes.read().await;
                let selection = select_candidate_meshes(
                    &meshes,
                    &request.start,
                    &request.end,
                    request.vehicle_type.as_deref(),
                );
                if selection.is_empty() {
                    tracing::info!(
                        start = %request.start,
                        end = %request.end,
                        "No mesh covers both endpoints"
                    );
                    return Ok(Submission::NoCoverage);
                }
                (selection.meshes, selection.needs_vehicle_synthesis)
            }
        };

        // Reuse a cached route unless pinned to a mesh or forced fresh.
        if request.mesh_id.is_none() && !request.force_recalculate {
            let routes = self.stores.routes.read().await;
            if let Some(route_id) = find_existing_route_on_any(
                &routes,
                &candidates,
                &request.start,
                &request.end,
                self.tolerance_nm,
            ) {
                drop(routes);
                let mut jobs = self.stores.jobs.write().await;
                let job_id = match jobs.latest_job_for_route(&route_id) {
                    Some(job) => job.id,
                    None => {
                        // Route predates job tracking; synthesize a finished
                        // job so the client has something to poll.
                        let mesh_id = self
                            .stores
                            .routes
                            .read()
                            .await
                            .get(&route_id)
                            .map(|r| r.mesh_id)
                            .unwrap_or(candidates[0]);
                        jobs.add_job(Job::completed(route_id, mesh_id))
                    }
                };
                tracing::info!(%route_id, %job_id, "Reusing existing route");
                return Ok(Submission::Existing { job_id, route_id });
            }
        }

        let (current_mesh, fallbacks) = {
            let mut iter = candidates.into_iter();
            let first = iter
                .next()
                .ok_or_else(|| PolarwayError::Internal("empty candidate list".to_string()))?;
            (first, iter.collect::<Vec<_>>())
        };

        let route = Route::new(
            request.start,
            request.end,
            request.start_name,
            request.end_name,
            current_mesh,
        );
        let route_id = self.stores.routes.write().await.insert(route);

        let job = Job::new(
            route_id,
            current_mesh,
            fallbacks,
            request.vehicle_type,
            needs_vehicle_synthesis,
        );
        let job_id = self.stores.jobs.write().await.add_job(job);

        self.queue
            .send(JobTask { job_id })
            .await
            .map_err(|e| PolarwayError::Internal(format!("job queue closed: {e}")))?;

        tracing::info!(%job_id, %route_id, mesh = %current_mesh, "Route job queued");
        Ok(Submission::Queued { job_id })
    }
}
