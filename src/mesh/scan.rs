//! Periodic mesh directory scanner.
//!
//! Discovers new mesh JSON files on a filesystem path and feeds them through
//! the same ingestion entrypoint as manual insertion. Runs until the shutdown
//! token is cancelled.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::ScanConfig;
use crate::mesh::{ingest_mesh, MeshStore};
use crate::vehicle::VehicleStore;

/// Scan the directory once. Returns the number of newly ingested meshes.
pub async fn scan_mesh_dir(
    dir: &Path,
    meshes: &Arc<RwLock<MeshStore>>,
    vehicles: &Arc<RwLock<VehicleStore>>,
) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to read mesh directory");
            return 0;
        }
    };

    let mut added = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("mesh.json")
            .to_string();

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                // File may still be transferring; pick it up next scan.
                tracing::warn!(file = %path.display(), error = %e, "Cannot read mesh file, skipping");
                continue;
            }
        };
        let json: serde_json::Value = match serde_json::from_slice(&raw) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Mesh file is not valid JSON, skipping");
                continue;
            }
        };

        let mut mesh_store = meshes.write().await;
        let mut vehicle_store = vehicles.write().await;
        match ingest_mesh(&mut mesh_store, &mut vehicle_store, json, &name, None) {
            Ok(outcome) if outcome.created => added += 1,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Mesh ingestion failed, skipping")
            }
        }
    }

    added
}

/// Run the scanner loop until shutdown.
pub async fn run_scanner(
    config: ScanConfig,
    meshes: Arc<RwLock<MeshStore>>,
    vehicles: Arc<RwLock<VehicleStore>>,
    shutdown: CancellationToken,
) {
    let Some(dir) = config.mesh_dir else {
        return;
    };
    let mut interval = tokio::time::interval(Duration::from_secs(config.interval_secs.max(1)));
    tracing::info!(dir = %dir.display(), interval_secs = config.interval_secs, "Mesh scanner started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Mesh scanner stopping");
                break;
            }
            _ = interval.tick() => {
                let added = scan_mesh_dir(&dir, &meshes, &vehicles).await;
                if added > 0 {
                    tracing::info!(added, "Mesh scan complete");
                }
            }
        }
    }
}
