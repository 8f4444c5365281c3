//! HTTP API surface.
//!
//! Route requests come in here, are validated at the boundary, and hand off
//! to the [`Dispatcher`]. Everything else is bookkeeping around the stores:
//! job status polling, cancellation, vehicle and mesh management.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::PolarwayError;
use crate::geo::LatLon;
use crate::mesh::ingest_mesh;
use crate::route::Route;
use crate::scheduler::{Dispatcher, Job, JobState, RouteRequest, Submission};
use crate::state::Stores;
use crate::vehicle::Vehicle;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<ServerConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/route", post(submit_route))
        .route("/api/route/{id}", get(get_route))
        .route("/api/recent_routes", get(recent_routes))
        .route("/api/job/{id}", get(job_status).delete(cancel_job))
        .route("/api/vehicle", post(upsert_vehicle).get(list_vehicles))
        .route(
            "/api/vehicle/{vessel_type}",
            get(get_vehicle).delete(delete_vehicle),
        )
        .route("/api/vessel_types", get(vessel_types))
        .route("/api/mesh", post(upload_mesh))
        .route("/api/mesh/{id}", get(get_mesh))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the shutdown token fires.
pub async fn run_server(
    config: Arc<ServerConfig>,
    state: AppState,
    shutdown: CancellationToken,
) -> crate::error::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    tracing::info!("API server stopped");
    Ok(())
}

/// Errors crossing the HTTP boundary.
struct ApiError(PolarwayError);

impl From<PolarwayError> for ApiError {
    fn from(e: PolarwayError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PolarwayError::InvalidCoordinates(_)
            | PolarwayError::InvalidVehicle(_)
            | PolarwayError::InvalidMesh(_)
            | PolarwayError::Json(_) => StatusCode::BAD_REQUEST,
            PolarwayError::NotFound { .. } => StatusCode::NOT_FOUND,
            PolarwayError::VehicleExists(_) => StatusCode::NOT_ACCEPTABLE,
            PolarwayError::NoCoverage
            | PolarwayError::Io(_)
            | PolarwayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct RouteRequestBody {
    start_lat: f64,
    start_lon: f64,
    end_lat: f64,
    end_lon: f64,
    #[serde(default)]
    start_name: Option<String>,
    #[serde(default)]
    end_name: Option<String>,
    #[serde(default)]
    vehicle_type: Option<String>,
    #[serde(default)]
    mesh_id: Option<Uuid>,
    #[serde(default)]
    force_recalculate: bool,
}

#[derive(Debug, Serialize)]
struct JobStatusResponse {
    id: Uuid,
    status: String,
    polarway_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    route: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

fn route_payload(route: &Route) -> Value {
    json!({
        "id": route.id,
        "start": route.start,
        "end": route.end,
        "start_name": route.start_name,
        "end_name": route.end_name,
        "mesh_id": route.mesh_id,
        "requested": route.requested,
        "calculated": route.calculated,
        "geometry": route.geometry,
        "metrics": route.metrics,
        "engine_version": route.engine_version,
    })
}

async fn job_response(stores: &Stores, job: &Job) -> JobStatusResponse {
    let route = if job.state == JobState::Success {
        stores
            .routes
            .read()
            .await
            .get(&job.route_id)
            .map(route_payload)
    } else {
        None
    };
    let error = job.error.as_ref().map(|e| {
        json!({
            "message": e.message,
            "attempted_meshes": e.attempted_meshes,
        })
    });
    JobStatusResponse {
        id: job.id,
        status: job.state.to_string(),
        polarway_version: VERSION,
        route,
        error,
    }
}

async fn submit_route(
    State(state): State<AppState>,
    Json(body): Json<RouteRequestBody>,
) -> Result<Response, ApiError> {
    // Coordinate validation before any record is created.
    let start = LatLon::new(body.start_lat, body.start_lon)?;
    let end = LatLon::new(body.end_lat, body.end_lon)?;

    let request = RouteRequest {
        start,
        end,
        start_name: body.start_name,
        end_name: body.end_name,
        vehicle_type: body.vehicle_type,
        mesh_id: body.mesh_id,
        force_recalculate: body.force_recalculate,
    };

    match state.dispatcher.submit(request).await? {
        Submission::NoCoverage => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "NO_COVERAGE",
                "info": "No mesh covers both the start and end points",
                "polarway_version": VERSION,
            })),
        )
            .into_response()),
        Submission::Existing { job_id, .. } => {
            let jobs = state.stores.jobs.read().await;
            let job = jobs
                .get(&job_id)
                .ok_or_else(|| PolarwayError::not_found("Job", job_id))?;
            let response = job_response(&state.stores, job).await;
            Ok((StatusCode::OK, Json(response)).into_response())
        }
        Submission::Queued { job_id } => Ok((
            StatusCode::ACCEPTED,
            Json(json!({
                "id": job_id,
                "status_url": format!("/api/job/{job_id}"),
                "polarway_version": VERSION,
            })),
        )
            .into_response()),
    }
}

async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let jobs = state.stores.jobs.read().await;
    let job = jobs
        .get(&id)
        .ok_or_else(|| PolarwayError::not_found("Job", id))?;
    Ok(Json(job_response(&state.stores, job).await))
}

/// Cancel a queued or running job. Cooperative: a running computation
/// finishes its current attempt but the result is discarded.
async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let mut jobs = state.stores.jobs.write().await;
    if jobs.get(&id).is_none() {
        return Err(PolarwayError::not_found("Job", id).into());
    }
    let revoked = jobs.revoke(&id);
    tracing::info!(job_id = %id, revoked, "Cancellation requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "id": id, "revoked": revoked })),
    )
        .into_response())
}

async fn get_route(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let routes = state.stores.routes.read().await;
    let route = routes
        .get(&id)
        .ok_or_else(|| PolarwayError::not_found("Route", id))?;
    Ok(Json(route_payload(route)))
}

async fn recent_routes(State(state): State<AppState>) -> Json<Value> {
    let window = Duration::hours(state.config.recent_window_hours);
    let jobs = state.stores.jobs.read().await;
    let routes = state.stores.routes.read().await;

    let entries: Vec<Value> = jobs
        .recent(window)
        .into_iter()
        .map(|job| {
            let route = routes.get(&job.route_id).map(route_payload);
            json!({
                "job_id": job.id,
                "status": job.state.to_string(),
                "route": route,
            })
        })
        .collect();

    Json(json!({ "polarway_version": VERSION, "jobs": entries }))
}

#[derive(Debug, Deserialize)]
struct VehicleBody {
    #[serde(flatten)]
    vehicle: Vehicle,
    /// Overwrite an existing profile of the same vessel type.
    #[serde(default)]
    force_properties: bool,
}

async fn upsert_vehicle(
    State(state): State<AppState>,
    Json(body): Json<VehicleBody>,
) -> Result<Response, ApiError> {
    let vessel_type = body.vehicle.vessel_type.clone();
    let created = state
        .stores
        .vehicles
        .write()
        .await
        .upsert(body.vehicle, body.force_properties)?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    tracing::info!(%vessel_type, created, "Vehicle stored");
    Ok((status, Json(json!({ "vessel_type": vessel_type }))).into_response())
}

async fn list_vehicles(State(state): State<AppState>) -> Json<Value> {
    let vehicles = state.stores.vehicles.read().await;
    Json(json!({ "vehicles": vehicles.all() }))
}

async fn get_vehicle(
    State(state): State<AppState>,
    Path(vessel_type): Path<String>,
) -> Result<Json<Vehicle>, ApiError> {
    let vehicles = state.stores.vehicles.read().await;
    let vehicle = vehicles
        .get(&vessel_type)
        .ok_or_else(|| PolarwayError::not_found("Vehicle", &vessel_type))?;
    Ok(Json(vehicle.clone()))
}

async fn delete_vehicle(
    State(state): State<AppState>,
    Path(vessel_type): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .stores
        .vehicles
        .write()
        .await
        .remove(&vessel_type)
        .ok_or_else(|| PolarwayError::not_found("Vehicle", &vessel_type))?;
    tracing::info!(%vessel_type, "Vehicle deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn vessel_types(State(state): State<AppState>) -> Json<Value> {
    let vehicles = state.stores.vehicles.read().await;
    Json(json!({ "vessel_types": vehicles.vessel_types() }))
}

#[derive(Debug, Deserialize)]
struct MeshUpload {
    #[serde(default)]
    name: Option<String>,
    mesh: Value,
}

async fn upload_mesh(
    State(state): State<AppState>,
    Json(body): Json<MeshUpload>,
) -> Result<Response, ApiError> {
    let name = body.name.unwrap_or_else(|| "upload".to_string());
    let mut meshes = state.stores.meshes.write().await;
    let mut vehicles = state.stores.vehicles.write().await;
    let outcome = ingest_mesh(&mut meshes, &mut vehicles, body.mesh, &name, None)?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(json!({ "id": outcome.mesh_id, "created": outcome.created })),
    )
        .into_response())
}

async fn get_mesh(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let meshes = state.stores.meshes.read().await;
    let mesh = meshes
        .get(&id)
        .ok_or_else(|| PolarwayError::not_found("Mesh", id))?;
    Ok(Json(json!({
        "id": mesh.id,
        "name": mesh.name,
        "fingerprint": mesh.fingerprint,
        "created": mesh.created,
        "valid_date_start": mesh.valid_date_start,
        "valid_date_end": mesh.valid_date_end,
        "bounds": {
            "lat_min": mesh.lat_min,
            "lat_max": mesh.lat_max,
            "lon_min": mesh.lon_min,
            "lon_max": mesh.lon_max,
        },
        "generator_version": mesh.generator_version,
        "kind": mesh.kind,
        "json": mesh.json,
    })))
}
