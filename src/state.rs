//! Shared in-memory state handed to the API, dispatcher and workers.

use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::mesh::MeshStore;
use crate::route::RouteStore;
use crate::scheduler::JobStore;
use crate::vehicle::VehicleStore;

/// All stores behind their own locks. Cloning is cheap; every component
/// holds its own handle.
#[derive(Debug, Clone, Default)]
pub struct Stores {
    pub meshes: Arc<RwLock<MeshStore>>,
    pub vehicles: Arc<RwLock<VehicleStore>>,
    pub routes: Arc<RwLock<RouteStore>>,
    pub jobs: Arc<RwLock<JobStore>>,
}

impl Stores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a job and the route it was computing. Other jobs pointing at
    /// the same route (e.g. synthetic cache-hit jobs) keep the route alive.
    pub async fn delete_job(&self, job_id: &Uuid) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.remove(job_id) else {
            return false;
        };
        let route_still_referenced = jobs
            .all()
            .iter()
            .any(|j| j.route_id == job.route_id);
        drop(jobs);

        if !route_still_referenced {
            self.routes.write().await.remove(&job.route_id);
        }
        true
    }
}
