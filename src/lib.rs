//! Asynchronous route-planning server for polar waters.
//!
//! Accepts route requests over HTTP, selects the best available
//! discretized environment mesh for the requested endpoints, and computes
//! routes asynchronously through a pluggable optimization engine, falling
//! back to coarser meshes when a target proves inaccessible.

pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod mesh;
pub mod optimizer;
pub mod route;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod vehicle;
pub mod worker;

pub use config::ServerConfig;
pub use error::{PolarwayError, Result};
pub use state::Stores;
