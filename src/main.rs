use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use polarway::api::{run_server, AppState};
use polarway::mesh::scan::run_scanner;
use polarway::optimizer::GreatCircleEstimator;
use polarway::scheduler::Dispatcher;
use polarway::shutdown::shutdown_token;
use polarway::worker::WorkerPool;
use polarway::{PolarwayError, Result, ServerConfig, Stores};

#[derive(Parser)]
#[command(name = "polarway", version, about = "Route-planning server for polar waters")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server and worker pool.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:8000")]
        listen: SocketAddr,
        /// Number of route-computation workers.
        #[arg(long, default_value_t = 2)]
        workers: usize,
        /// Haversine tolerance for reusing existing routes, nautical miles.
        #[arg(long, default_value_t = 1.0)]
        tolerance_nm: f64,
        /// Directory to scan periodically for new mesh files.
        #[arg(long)]
        mesh_dir: Option<PathBuf>,
        /// Seconds between mesh directory scans.
        #[arg(long, default_value_t = 300)]
        scan_interval: u64,
    },
    /// Upload a mesh file to a running server.
    InsertMesh {
        /// Server base URL.
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        server: String,
        /// Mesh JSON file to upload.
        file: PathBuf,
    },
    /// Request a route and poll until it completes.
    Request {
        /// Server base URL.
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        server: String,
        #[arg(long, allow_hyphen_values = true)]
        start_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        start_lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        end_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        end_lon: f64,
        #[arg(long)]
        vehicle: Option<String>,
        /// Recompute even when a cached route would satisfy the request.
        #[arg(long)]
        force: bool,
        /// Seconds between status polls.
        #[arg(long, default_value_t = 5)]
        poll_interval: u64,
        /// Write the resulting route JSON here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match Cli::parse().command {
        Command::Serve {
            listen,
            workers,
            tolerance_nm,
            mesh_dir,
            scan_interval,
        } => {
            let mut config = ServerConfig::new(listen)
                .with_workers(workers)
                .with_tolerance_nm(tolerance_nm);
            if let Some(dir) = mesh_dir {
                config = config.with_mesh_dir(dir, scan_interval);
            }
            serve(config).await
        }
        Command::InsertMesh { server, file } => insert_mesh(&server, &file).await,
        Command::Request {
            server,
            start_lat,
            start_lon,
            end_lat,
            end_lon,
            vehicle,
            force,
            poll_interval,
            output,
        } => {
            request_route(
                &server,
                (start_lat, start_lon),
                (end_lat, end_lon),
                vehicle,
                force,
                poll_interval,
                output,
            )
            .await
        }
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    let config = Arc::new(config);
    let stores = Stores::new();
    let shutdown = shutdown_token();

    let (queue_tx, queue_rx) = async_channel::bounded(config.queue_capacity);
    let dispatcher = Arc::new(Dispatcher::new(
        stores.clone(),
        config.tolerance_nm,
        queue_tx.clone(),
    ));

    WorkerPool::new(
        stores.clone(),
        Arc::new(GreatCircleEstimator),
        queue_tx,
        queue_rx,
    )
    .spawn(config.workers, shutdown.clone());

    if config.scan.is_enabled() {
        tokio::spawn(run_scanner(
            config.scan.clone(),
            stores.meshes.clone(),
            stores.vehicles.clone(),
            shutdown.clone(),
        ));
    }

    let state = AppState {
        stores,
        dispatcher,
        config: config.clone(),
    };
    run_server(config, state, shutdown).await
}

async fn insert_mesh(server: &str, file: &std::path::Path) -> Result<()> {
    let raw = tokio::fs::read(file).await?;
    let mesh: serde_json::Value = serde_json::from_slice(&raw)?;
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("mesh.json");

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{server}/api/mesh"))
        .json(&serde_json::json!({ "name": name, "mesh": mesh }))
        .send()
        .await
        .map_err(|e| PolarwayError::Internal(format!("mesh upload failed: {e}")))?;

    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| PolarwayError::Internal(format!("bad upload response: {e}")))?;
    if !status.is_success() {
        return Err(PolarwayError::Internal(format!(
            "server rejected mesh ({status}): {body}"
        )));
    }
    tracing::info!(id = %body["id"], created = %body["created"], "Mesh uploaded");
    Ok(())
}

async fn request_route(
    server: &str,
    start: (f64, f64),
    end: (f64, f64),
    vehicle: Option<String>,
    force: bool,
    poll_interval: u64,
    output: Option<PathBuf>,
) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{server}/api/route"))
        .json(&serde_json::json!({
            "start_lat": start.0,
            "start_lon": start.1,
            "end_lat": end.0,
            "end_lon": end.1,
            "vehicle_type": vehicle,
            "force_recalculate": force,
        }))
        .send()
        .await
        .map_err(|e| PolarwayError::Internal(format!("route request failed: {e}")))?;

    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| PolarwayError::Internal(format!("bad route response: {e}")))?;

    if status == reqwest::StatusCode::BAD_REQUEST {
        return Err(PolarwayError::Internal(format!("request rejected: {body}")));
    }
    if body["status"] == "NO_COVERAGE" {
        tracing::warn!("No mesh covers the requested endpoints");
        return Ok(());
    }

    // 200 means a cached route was returned directly.
    let final_status = if status == reqwest::StatusCode::OK {
        body
    } else {
        let job_id = body["id"]
            .as_str()
            .ok_or_else(|| PolarwayError::Internal(format!("no job id in response: {body}")))?
            .to_string();
        tracing::info!(%job_id, "Route queued, polling");
        poll_job(&client, server, &job_id, poll_interval).await?
    };

    let rendered = serde_json::to_string_pretty(&final_status)?;
    match output {
        Some(path) => tokio::fs::write(path, rendered).await?,
        None => println!("{rendered}"),
    }
    Ok(())
}

async fn poll_job(
    client: &reqwest::Client,
    server: &str,
    job_id: &str,
    poll_interval: u64,
) -> Result<serde_json::Value> {
    loop {
        tokio::time::sleep(Duration::from_secs(poll_interval.max(1))).await;
        let body: serde_json::Value = client
            .get(format!("{server}/api/job/{job_id}"))
            .send()
            .await
            .map_err(|e| PolarwayError::Internal(format!("status poll failed: {e}")))?
            .json()
            .await
            .map_err(|e| PolarwayError::Internal(format!("bad status response: {e}")))?;

        match body["status"].as_str() {
            Some("SUCCESS") | Some("FAILURE") | Some("REVOKED") => return Ok(body),
            other => tracing::info!(%job_id, status = other.unwrap_or("?"), "Still waiting"),
        }
    }
}
