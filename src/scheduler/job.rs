use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job lifecycle. `Pending -> Started -> {Success | Failure | Revoked}`,
/// with `Retry` re-entering `Started` when the fallback driver resubmits
/// against the next candidate mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Started,
    Retry,
    Success,
    Failure,
    Revoked,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failure | JobState::Revoked)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Started => write!(f, "STARTED"),
            JobState::Retry => write!(f, "RETRY"),
            JobState::Success => write!(f, "SUCCESS"),
            JobState::Failure => write!(f, "FAILURE"),
            JobState::Revoked => write!(f, "REVOKED"),
        }
    }
}

/// Structured failure detail recorded on the job. Always names the meshes
/// that were attempted so clients can tell coverage problems apart from
/// engine failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailure {
    pub message: String,
    pub attempted_meshes: Vec<Uuid>,
}

/// One asynchronous route-computation attempt, possibly spanning several
/// mesh fallback attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub route_id: Uuid,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
    /// Mesh currently being attempted.
    pub current_mesh: Uuid,
    /// Remaining fallback candidates, in selector priority order.
    pub pending_meshes: Vec<Uuid>,
    /// Meshes already attempted and failed with an inaccessible target.
    pub attempted_meshes: Vec<Uuid>,
    /// Set when the current mesh is an environment mesh and a vehicle mesh
    /// must be synthesized before optimization.
    pub needs_vehicle_synthesis: bool,
    /// Number of RETRY transitions this job has gone through.
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        route_id: Uuid,
        current_mesh: Uuid,
        pending_meshes: Vec<Uuid>,
        vehicle_type: Option<String>,
        needs_vehicle_synthesis: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            route_id,
            state: JobState::Pending,
            vehicle_type,
            current_mesh,
            pending_meshes,
            attempted_meshes: Vec::new(),
            needs_vehicle_synthesis,
            retries: 0,
            error: None,
            created: Utc::now(),
            completed_at: None,
        }
    }

    /// Synthetic already-complete job pointing at an existing route, used
    /// when a cached result satisfies a request without enqueueing work.
    pub fn completed(route_id: Uuid, mesh_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            route_id,
            state: JobState::Success,
            vehicle_type: None,
            current_mesh: mesh_id,
            pending_meshes: Vec::new(),
            attempted_meshes: Vec::new(),
            needs_vehicle_synthesis: false,
            retries: 0,
            error: None,
            created: now,
            completed_at: Some(now),
        }
    }
}

/// Serializable task description carried by the worker queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTask {
    pub job_id: Uuid,
}
