use std::net::SocketAddr;
use std::path::PathBuf;

/// Configuration for the periodic mesh directory scanner.
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Directory to scan for new mesh JSON files. Scanning is disabled when
    /// unset.
    pub mesh_dir: Option<PathBuf>,
    /// Seconds between scans.
    pub interval_secs: u64,
}

impl ScanConfig {
    pub fn is_enabled(&self) -> bool {
        self.mesh_dir.is_some() && self.interval_secs > 0
    }
}

/// Server configuration, passed explicitly to each component at construction.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Number of worker tasks consuming the job queue.
    pub workers: usize,
    /// Capacity of the job queue channel.
    pub queue_capacity: usize,
    /// Haversine distance within which an existing route satisfies a new
    /// request, in nautical miles.
    pub tolerance_nm: f64,
    /// Trailing window for the recent-routes listing, in hours.
    pub recent_window_hours: i64,
    pub scan: ScanConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:8000"
                .parse()
                .expect("default listen address is valid"),
            workers: 2,
            queue_capacity: 1024,
            tolerance_nm: 1.0,
            recent_window_hours: 24,
            scan: ScanConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_tolerance_nm(mut self, tolerance_nm: f64) -> Self {
        self.tolerance_nm = tolerance_nm;
        self
    }

    pub fn with_mesh_dir(mut self, dir: PathBuf, interval_secs: u64) -> Self {
        self.scan = ScanConfig {
            mesh_dir: Some(dir),
            interval_secs,
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8000");
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.tolerance_nm, 1.0);
        assert_eq!(cfg.recent_window_hours, 24);
        assert!(!cfg.scan.is_enabled());
    }

    #[test]
    fn server_config_new() {
        let addr: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let cfg = ServerConfig::new(addr);
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.workers, 2);
    }

    #[test]
    fn with_workers_floors_at_one() {
        let cfg = ServerConfig::default().with_workers(0);
        assert_eq!(cfg.workers, 1);
    }

    #[test]
    fn with_mesh_dir_enables_scanning() {
        let cfg = ServerConfig::default().with_mesh_dir(PathBuf::from("/meshes"), 300);
        assert!(cfg.scan.is_enabled());
        assert_eq!(cfg.scan.mesh_dir.as_deref(), Some(std::path::Path::new("/meshes")));
        assert_eq!(cfg.scan.interval_secs, 300);
    }

    #[test]
    fn scan_config_disabled_without_interval() {
        let scan = ScanConfig {
            mesh_dir: Some(PathBuf::from("/meshes")),
            interval_secs: 0,
        };
        assert!(!scan.is_enabled());
    }
}
