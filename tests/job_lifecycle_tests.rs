use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use polarway::geo::LatLon;
use polarway::mesh::ingest_mesh;
use polarway::mesh::{Mesh, MeshKind};
use polarway::optimizer::{ComputedRoute, OptimizeError, RouteOptimizer};
use polarway::route::RouteMetrics;
use polarway::scheduler::{Dispatcher, JobState, RouteRequest, Submission};
use polarway::vehicle::Vehicle;
use polarway::worker::WorkerPool;
use polarway::Stores;

/// Optimizer with scripted per-mesh outcomes, matched by mesh name.
struct ScriptedOptimizer {
    inaccessible: HashSet<String>,
    fatal: HashSet<String>,
}

impl ScriptedOptimizer {
    fn new() -> Self {
        Self {
            inaccessible: HashSet::new(),
            fatal: HashSet::new(),
        }
    }

    fn inaccessible_on(mut self, name: &str) -> Self {
        self.inaccessible.insert(name.to_string());
        self
    }

    fn fatal_on(mut self, name: &str) -> Self {
        self.fatal.insert(name.to_string());
        self
    }
}

impl RouteOptimizer for ScriptedOptimizer {
    fn optimize(
        &self,
        mesh: &Mesh,
        start: &LatLon,
        end: &LatLon,
        _vehicle: Option<&Vehicle>,
    ) -> Result<ComputedRoute, OptimizeError> {
        if self.inaccessible.contains(&mesh.name) {
            return Err(OptimizeError::Inaccessible(format!(
                "no path on {}",
                mesh.name
            )));
        }
        if self.fatal.contains(&mesh.name) {
            return Err(OptimizeError::Computation(format!(
                "engine crashed on {}",
                mesh.name
            )));
        }
        Ok(ComputedRoute {
            geometry: json!({
                "type": "LineString",
                "coordinates": [[start.lon, start.lat], [end.lon, end.lat]],
            }),
            metrics: RouteMetrics {
                time_days: 2.0,
                fuel_tonnes: 11.0,
                distance_nm: 700.0,
            },
            engine_version: "scripted/1.0".to_string(),
        })
    }

    fn build_vehicle_mesh(&self, env_mesh: &Mesh, vehicle: &Vehicle) -> Result<Value, OptimizeError> {
        let mut json = env_mesh.json.clone();
        json["config"]["vessel_info"] = json!({"vessel_type": vehicle.vessel_type});
        Ok(json)
    }

    fn version(&self) -> &str {
        "scripted/1.0"
    }
}

fn mesh_json(name: &str, bounds: (f64, f64, f64, f64)) -> Value {
    let (lat_min, lat_max, lon_min, lon_max) = bounds;
    json!({
        "config": {
            "mesh_info": {
                "marker": name,
                "region": {
                    "lat_min": lat_min, "lat_max": lat_max,
                    "long_min": lon_min, "long_max": lon_max,
                    "start_time": "2024-01-01", "end_time": "2024-01-03"
                }
            }
        },
        "cellboxes": []
    })
}

// Bounds both containing the Falklands / South Georgia test points; the
// small one sorts first in candidate order.
const SMALL: (f64, f64, f64, f64) = (-56.0, -50.0, -60.0, -35.0);
const LARGE: (f64, f64, f64, f64) = (-65.0, -40.0, -70.0, -30.0);

async fn seed_mesh(stores: &Stores, name: &str, bounds: (f64, f64, f64, f64)) -> Uuid {
    let created = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
    let mut meshes = stores.meshes.write().await;
    let mut vehicles = stores.vehicles.write().await;
    ingest_mesh(
        &mut meshes,
        &mut vehicles,
        mesh_json(name, bounds),
        name,
        Some(created),
    )
    .unwrap()
    .mesh_id
}

fn start_workers(
    stores: &Stores,
    optimizer: ScriptedOptimizer,
) -> (Dispatcher, CancellationToken) {
    let (tx, rx) = async_channel::bounded(64);
    let dispatcher = Dispatcher::new(stores.clone(), 1.0, tx.clone());
    let shutdown = CancellationToken::new();
    WorkerPool::new(stores.clone(), Arc::new(optimizer), tx, rx).spawn(1, shutdown.clone());
    (dispatcher, shutdown)
}

fn request() -> RouteRequest {
    RouteRequest {
        start: LatLon::new(-51.73, -57.71).unwrap(),
        end: LatLon::new(-54.03, -38.04).unwrap(),
        start_name: Some("Falklands".to_string()),
        end_name: Some("South Georgia".to_string()),
        vehicle_type: None,
        mesh_id: None,
        force_recalculate: false,
    }
}

async fn submit_queued(dispatcher: &Dispatcher) -> Uuid {
    match dispatcher.submit(request()).await.unwrap() {
        Submission::Queued { job_id } => job_id,
        other => panic!("expected a queued job, got {other:?}"),
    }
}

async fn wait_terminal(stores: &Stores, job_id: &Uuid) -> JobState {
    for _ in 0..200 {
        {
            let jobs = stores.jobs.read().await;
            let state = jobs.get(job_id).unwrap().state;
            if state.is_terminal() {
                return state;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not reach a terminal state");
}

#[tokio::test]
async fn computes_route_on_best_mesh() {
    let stores = Stores::new();
    let small = seed_mesh(&stores, "small", SMALL).await;
    seed_mesh(&stores, "large", LARGE).await;
    let (dispatcher, _shutdown) = start_workers(&stores, ScriptedOptimizer::new());

    let job_id = submit_queued(&dispatcher).await;
    assert_eq!(wait_terminal(&stores, &job_id).await, JobState::Success);

    let jobs = stores.jobs.read().await;
    let job = jobs.get(&job_id).unwrap();
    assert_eq!(job.current_mesh, small);
    assert_eq!(job.retries, 0);

    let routes = stores.routes.read().await;
    let route = routes.get(&job.route_id).unwrap();
    assert!(route.is_calculated());
    assert_eq!(route.mesh_id, small);
    assert_eq!(route.engine_version.as_deref(), Some("scripted/1.0"));
}

#[tokio::test]
async fn falls_back_to_next_mesh_on_inaccessible_target() {
    let stores = Stores::new();
    let small = seed_mesh(&stores, "small", SMALL).await;
    let large = seed_mesh(&stores, "large", LARGE).await;
    let (dispatcher, _shutdown) =
        start_workers(&stores, ScriptedOptimizer::new().inaccessible_on("small"));

    let job_id = submit_queued(&dispatcher).await;
    assert_eq!(wait_terminal(&stores, &job_id).await, JobState::Success);

    let jobs = stores.jobs.read().await;
    let job = jobs.get(&job_id).unwrap();
    assert_eq!(job.retries, 1);
    assert_eq!(job.attempted_meshes, vec![small]);
    assert_eq!(job.current_mesh, large);

    let routes = stores.routes.read().await;
    assert_eq!(routes.get(&job.route_id).unwrap().mesh_id, large);
}

#[tokio::test]
async fn fails_after_exhausting_all_meshes() {
    let stores = Stores::new();
    let small = seed_mesh(&stores, "small", SMALL).await;
    let large = seed_mesh(&stores, "large", LARGE).await;
    let (dispatcher, _shutdown) = start_workers(
        &stores,
        ScriptedOptimizer::new()
            .inaccessible_on("small")
            .inaccessible_on("large"),
    );

    let job_id = submit_queued(&dispatcher).await;
    assert_eq!(wait_terminal(&stores, &job_id).await, JobState::Failure);

    let jobs = stores.jobs.read().await;
    let job = jobs.get(&job_id).unwrap();
    let error = job.error.as_ref().unwrap();
    assert!(error.message.contains("Inaccessible"));
    assert_eq!(error.attempted_meshes, vec![small, large]);

    let routes = stores.routes.read().await;
    assert!(!routes.get(&job.route_id).unwrap().is_calculated());
}

#[tokio::test]
async fn fatal_engine_error_does_not_retry() {
    let stores = Stores::new();
    seed_mesh(&stores, "small", SMALL).await;
    let large = seed_mesh(&stores, "large", LARGE).await;
    let (dispatcher, _shutdown) =
        start_workers(&stores, ScriptedOptimizer::new().fatal_on("small"));

    let job_id = submit_queued(&dispatcher).await;
    assert_eq!(wait_terminal(&stores, &job_id).await, JobState::Failure);

    let jobs = stores.jobs.read().await;
    let job = jobs.get(&job_id).unwrap();
    assert_eq!(job.retries, 0);
    assert!(job.error.as_ref().unwrap().message.contains("engine crashed"));
    // The fallback mesh was never touched.
    assert_eq!(job.pending_meshes, vec![large]);
}

#[tokio::test]
async fn revoked_before_pickup_stays_revoked() {
    let stores = Stores::new();
    seed_mesh(&stores, "small", SMALL).await;

    // Enqueue and revoke before any worker exists.
    let (tx, rx) = async_channel::bounded(64);
    let dispatcher = Dispatcher::new(stores.clone(), 1.0, tx.clone());
    let job_id = submit_queued(&dispatcher).await;
    assert!(stores.jobs.write().await.revoke(&job_id));

    let shutdown = CancellationToken::new();
    WorkerPool::new(stores.clone(), Arc::new(ScriptedOptimizer::new()), tx, rx)
        .spawn(1, shutdown.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let jobs = stores.jobs.read().await;
    let job = jobs.get(&job_id).unwrap();
    assert_eq!(job.state, JobState::Revoked);

    let routes = stores.routes.read().await;
    assert!(!routes.get(&job.route_id).unwrap().is_calculated());
}

#[tokio::test]
async fn second_request_reuses_computed_route() {
    let stores = Stores::new();
    seed_mesh(&stores, "small", SMALL).await;
    let (dispatcher, _shutdown) = start_workers(&stores, ScriptedOptimizer::new());

    let job_id = submit_queued(&dispatcher).await;
    assert_eq!(wait_terminal(&stores, &job_id).await, JobState::Success);
    let route_id = stores.jobs.read().await.get(&job_id).unwrap().route_id;

    // Slightly offset endpoints, still within the 1 nm tolerance.
    let mut nearby = request();
    nearby.start = LatLon::new(-51.735, -57.71).unwrap();
    match dispatcher.submit(nearby).await.unwrap() {
        Submission::Existing {
            route_id: found, ..
        } => assert_eq!(found, route_id),
        other => panic!("expected reuse, got {other:?}"),
    }
}

#[tokio::test]
async fn newer_mesh_invalidates_cached_route() {
    let stores = Stores::new();
    seed_mesh(&stores, "small", SMALL).await;
    let (dispatcher, _shutdown) = start_workers(&stores, ScriptedOptimizer::new());

    let first = submit_queued(&dispatcher).await;
    assert_eq!(wait_terminal(&stores, &first).await, JobState::Success);

    // A mesh ingested on a later date pushes the old one out of the
    // candidate list, so its cached route no longer satisfies requests.
    let newer_created = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
    {
        let mut meshes = stores.meshes.write().await;
        let mut vehicles = stores.vehicles.write().await;
        ingest_mesh(
            &mut meshes,
            &mut vehicles,
            mesh_json("newer", LARGE),
            "newer",
            Some(newer_created),
        )
        .unwrap();
    }

    let second = submit_queued(&dispatcher).await;
    assert_ne!(first, second);
    assert_eq!(wait_terminal(&stores, &second).await, JobState::Success);
}

#[tokio::test]
async fn force_recalculate_computes_again() {
    let stores = Stores::new();
    seed_mesh(&stores, "small", SMALL).await;
    let (dispatcher, _shutdown) = start_workers(&stores, ScriptedOptimizer::new());

    let first = submit_queued(&dispatcher).await;
    assert_eq!(wait_terminal(&stores, &first).await, JobState::Success);

    let mut forced = request();
    forced.force_recalculate = true;
    let second = match dispatcher.submit(forced).await.unwrap() {
        Submission::Queued { job_id } => job_id,
        other => panic!("expected a fresh job, got {other:?}"),
    };
    assert_ne!(first, second);
    assert_eq!(wait_terminal(&stores, &second).await, JobState::Success);

    let jobs = stores.jobs.read().await;
    let (a, b) = (jobs.get(&first).unwrap(), jobs.get(&second).unwrap());
    assert_ne!(a.route_id, b.route_id);
}

#[tokio::test]
async fn vehicle_mesh_is_synthesized_on_demand() {
    let stores = Stores::new();
    let env = seed_mesh(&stores, "small", SMALL).await;
    stores
        .vehicles
        .write()
        .await
        .upsert(
            Vehicle {
                vessel_type: "SDA".to_string(),
                max_speed: 26.5,
                unit: "km/hr".to_string(),
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
    let (dispatcher, _shutdown) = start_workers(&stores, ScriptedOptimizer::new());

    let mut req = request();
    req.vehicle_type = Some("SDA".to_string());
    let job_id = match dispatcher.submit(req).await.unwrap() {
        Submission::Queued { job_id } => job_id,
        other => panic!("expected a queued job, got {other:?}"),
    };
    assert_eq!(wait_terminal(&stores, &job_id).await, JobState::Success);

    let meshes = stores.meshes.read().await;
    let synthesized = meshes
        .vehicle_mesh_for(&env, "SDA")
        .expect("vehicle mesh should have been synthesized");
    assert_eq!(
        synthesized.kind,
        MeshKind::Vehicle {
            vessel_type: "SDA".to_string()
        }
    );

    let jobs = stores.jobs.read().await;
    let routes = stores.routes.read().await;
    let route = routes
        .get(&jobs.get(&job_id).unwrap().route_id)
        .unwrap();
    assert_eq!(route.mesh_id, synthesized.id);
}
