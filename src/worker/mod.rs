//! Worker pool driving route computations.
//!
//! Workers pull [`JobTask`]s off the shared queue, run the optimization
//! engine on the blocking thread pool, and drive the mesh fallback loop:
//! an inaccessible-target failure re-queues the job against the next
//! candidate mesh until one succeeds or the list is exhausted.

use std::sync::Arc;

use async_channel::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{PolarwayError, Result};
use crate::mesh::ingest::fingerprint;
use crate::mesh::{Mesh, MeshKind};
use crate::optimizer::{ComputedRoute, OptimizeError, RouteOptimizer};
use crate::scheduler::{FallbackOutcome, JobState, JobTask};
use crate::state::Stores;
use crate::vehicle::Vehicle;

pub struct WorkerPool {
    stores: Stores,
    optimizer: Arc<dyn RouteOptimizer>,
    queue_tx: Sender<JobTask>,
    queue_rx: Receiver<JobTask>,
}

impl WorkerPool {
    pub fn new(
        stores: Stores,
        optimizer: Arc<dyn RouteOptimizer>,
        queue_tx: Sender<JobTask>,
        queue_rx: Receiver<JobTask>,
    ) -> Self {
        Self {
            stores,
            optimizer,
            queue_tx,
            queue_rx,
        }
    }

    /// Spawn `count` worker tasks. Each runs until the queue closes or the
    /// shutdown token fires.
    pub fn spawn(self, count: usize, shutdown: CancellationToken) {
        for worker_id in 0..count.max(1) {
            let worker = Worker {
                id: worker_id,
                stores: self.stores.clone(),
                optimizer: Arc::clone(&self.optimizer),
                queue_tx: self.queue_tx.clone(),
                queue_rx: self.queue_rx.clone(),
            };
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await });
        }
    }
}

struct Worker {
    id: usize,
    stores: Stores,
    optimizer: Arc<dyn RouteOptimizer>,
    queue_tx: Sender<JobTask>,
    queue_rx: Receiver<JobTask>,
}

impl Worker {
    async fn run(&self, shutdown: CancellationToken) {
        tracing::debug!(worker = self.id, "Worker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(worker = self.id, "Worker stopping");
                    break;
                }
                task = self.queue_rx.recv() => {
                    match task {
                        Ok(task) => {
                            if let Err(e) = self.process(task).await {
                                tracing::error!(worker = self.id, job_id = %task.job_id, error = %e, "Job processing error");
                            }
                        }
                        Err(_) => break, // queue closed
                    }
                }
            }
        }
    }

    async fn process(&self, task: JobTask) -> Result<()> {
        let job_id = task.job_id;

        // Snapshot what we need, then release the lock for the computation.
        let (route_id, mesh_id, vehicle_type) = {
            let mut jobs = self.stores.jobs.write().await;
            let Some(job) = jobs.get(&job_id) else {
                tracing::debug!(%job_id, "Job vanished before pickup, skipping");
                return Ok(());
            };
            if job.state == JobState::Revoked {
                tracing::info!(%job_id, "Job revoked before pickup, skipping");
                return Ok(());
            }
            let snapshot = (job.route_id, job.current_mesh, job.vehicle_type.clone());
            if !jobs.mark_started(&job_id) {
                tracing::debug!(%job_id, "Job not startable, skipping");
                return Ok(());
            }
            snapshot
        };
        tracing::info!(worker = self.id, %job_id, mesh = %mesh_id, "Job started");

        let vehicle = match &vehicle_type {
            Some(vessel_type) => {
                match self.stores.vehicles.read().await.get(vessel_type) {
                    Some(v) => Some(v.clone()),
                    None => {
                        // Vehicle deleted between dispatch and pickup.
                        self.stores
                            .jobs
                            .write()
                            .await
                            .complete_failure(&job_id, format!("Vehicle '{vessel_type}' no longer exists"));
                        return Ok(());
                    }
                }
            }
            None => None,
        };

        let mesh = match self.resolve_mesh(&job_id, &route_id, mesh_id, vehicle.as_ref()).await? {
            Some(mesh) => mesh,
            None => return Ok(()), // failure already recorded
        };

        let (start, end) = {
            let routes = self.stores.routes.read().await;
            let Some(route) = routes.get(&route_id) else {
                self.stores
                    .jobs
                    .write()
                    .await
                    .complete_failure(&job_id, "Route record missing");
                return Ok(());
            };
            (route.start, route.end)
        };

        let outcome = self.optimize_blocking(mesh, start, end, vehicle).await?;

        match outcome {
            Ok(computed) => self.finish_success(&job_id, &route_id, computed).await,
            Err(OptimizeError::Inaccessible(reason)) => {
                tracing::warn!(%job_id, mesh = %mesh_id, %reason, "Target inaccessible on mesh");
                self.try_fallback(&job_id, &route_id, &reason).await?;
                Ok(())
            }
            Err(OptimizeError::Computation(reason)) => {
                tracing::error!(%job_id, %reason, "Route computation failed");
                self.stores
                    .jobs
                    .write()
                    .await
                    .complete_failure(&job_id, reason);
                Ok(())
            }
        }
    }

    /// Load the mesh to compute on. For a vehicle job on an environment
    /// mesh, reuse or synthesize the matching vehicle mesh and re-point the
    /// route at it. Returns None when a failure was recorded on the job.
    async fn resolve_mesh(
        &self,
        job_id: &Uuid,
        route_id: &Uuid,
        mesh_id: Uuid,
        vehicle: Option<&Vehicle>,
    ) -> Result<Option<Mesh>> {
        let env_mesh = {
            let meshes = self.stores.meshes.read().await;
            let Some(mesh) = meshes.get(&mesh_id) else {
                self.stores
                    .jobs
                    .write()
                    .await
                    .complete_failure(job_id, format!("Mesh {mesh_id} no longer exists"));
                return Ok(None);
            };
            let Some(vehicle) = vehicle else {
                return Ok(Some(mesh.clone()));
            };
            if mesh.vessel_type().is_some() {
                return Ok(Some(mesh.clone()));
            }
            // Synthesis needed; check for one built earlier first.
            if let Some(existing) = meshes.vehicle_mesh_for(&mesh_id, &vehicle.vessel_type) {
                let existing = existing.clone();
                drop(meshes);
                self.stores.routes.write().await.set_mesh(route_id, existing.id);
                return Ok(Some(existing));
            }
            mesh.clone()
        };

        let vehicle = vehicle
            .cloned()
            .ok_or_else(|| PolarwayError::Internal("vehicle lost during synthesis".to_string()))?;
        tracing::info!(%job_id, env_mesh = %env_mesh.id, vessel_type = %vehicle.vessel_type, "Synthesizing vehicle mesh");

        let optimizer = Arc::clone(&self.optimizer);
        let synth_env = env_mesh.clone();
        let synth_vehicle = vehicle.clone();
        let built = tokio::task::spawn_blocking(move || {
            optimizer.build_vehicle_mesh(&synth_env, &synth_vehicle)
        })
        .await
        .map_err(|e| PolarwayError::Internal(format!("synthesis task panicked: {e}")))?;

        let json = match built {
            Ok(json) => json,
            Err(e) => {
                self.stores
                    .jobs
                    .write()
                    .await
                    .complete_failure(job_id, format!("Vehicle mesh synthesis failed: {e}"));
                return Ok(None);
            }
        };

        let vehicle_mesh = Mesh {
            id: Uuid::new_v4(),
            name: format!("{}-{}", env_mesh.name, vehicle.vessel_type),
            fingerprint: fingerprint(&json),
            created: chrono::Utc::now(),
            valid_date_start: env_mesh.valid_date_start,
            valid_date_end: env_mesh.valid_date_end,
            lat_min: env_mesh.lat_min,
            lat_max: env_mesh.lat_max,
            lon_min: env_mesh.lon_min,
            lon_max: env_mesh.lon_max,
            json,
            generator_version: env_mesh.generator_version.clone(),
            kind: MeshKind::Vehicle {
                vessel_type: vehicle.vessel_type.clone(),
            },
            environment_mesh: Some(env_mesh.id),
        };

        let (stored_id, _) = self.stores.meshes.write().await.insert(vehicle_mesh);
        self.stores.routes.write().await.set_mesh(route_id, stored_id);

        let meshes = self.stores.meshes.read().await;
        Ok(meshes.get(&stored_id).cloned())
    }

    async fn optimize_blocking(
        &self,
        mesh: Mesh,
        start: crate::geo::LatLon,
        end: crate::geo::LatLon,
        vehicle: Option<Vehicle>,
    ) -> Result<std::result::Result<ComputedRoute, OptimizeError>> {
        let optimizer = Arc::clone(&self.optimizer);
        tokio::task::spawn_blocking(move || {
            optimizer.optimize(&mesh, &start, &end, vehicle.as_ref())
        })
        .await
        .map_err(|e| PolarwayError::Internal(format!("optimization task panicked: {e}")))
    }

    async fn finish_success(
        &self,
        job_id: &Uuid,
        route_id: &Uuid,
        computed: ComputedRoute,
    ) -> Result<()> {
        // The job transition is the gate: a revoke that landed mid-flight
        // wins and the late result is discarded.
        let accepted = self.stores.jobs.write().await.complete_success(job_id);
        if !accepted {
            tracing::warn!(%job_id, "Job no longer running, discarding result");
            return Ok(());
        }
        self.stores.routes.write().await.set_result(
            route_id,
            computed.geometry,
            computed.metrics,
            computed.engine_version,
        );
        tracing::info!(%job_id, %route_id, "Route computed");
        Ok(())
    }

    async fn try_fallback(&self, job_id: &Uuid, route_id: &Uuid, reason: &str) -> Result<()> {
        let outcome = self.stores.jobs.write().await.next_fallback(job_id);
        match outcome {
            FallbackOutcome::Retry(next_mesh) => {
                self.stores.routes.write().await.set_mesh(route_id, next_mesh);
                tracing::info!(%job_id, mesh = %next_mesh, "Retrying on fallback mesh");
                self.queue_tx
                    .send(JobTask { job_id: *job_id })
                    .await
                    .map_err(|e| PolarwayError::Internal(format!("job queue closed: {e}")))?;
            }
            FallbackOutcome::Exhausted => {
                tracing::warn!(%job_id, "All candidate meshes exhausted");
                self.stores
                    .jobs
                    .write()
                    .await
                    .complete_failure(job_id, format!("Inaccessible. No routes found: {reason}"));
            }
            FallbackOutcome::Halted => {
                tracing::debug!(%job_id, "Job halted during fallback, dropping");
            }
        }
        Ok(())
    }
}
