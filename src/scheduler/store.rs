//! In-memory job registry with guarded state transitions.
//!
//! All lifecycle moves go through this store so that terminal states stick:
//! once a job is SUCCESS, FAILURE or REVOKED, nothing changes it again. In
//! particular a revoke that lands while a worker is mid-computation wins;
//! the worker's late completion is refused and discarded.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::job::{Job, JobFailure, JobState};

/// Result of asking for the next fallback mesh after an inaccessible-target
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// Moved to RETRY; attempt this mesh next.
    Retry(Uuid),
    /// No candidate meshes left; the job should be failed.
    Exhausted,
    /// The job is no longer STARTED (revoked or already terminal); stop.
    Halted,
}

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: HashMap<Uuid, Job>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(&mut self, job: Job) -> Uuid {
        let id = job.id;
        self.jobs.insert(id, job);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<Job> {
        self.jobs.remove(id)
    }

    /// Worker picked the job up. Only PENDING and RETRY jobs start; a job
    /// revoked while queued stays revoked and the worker must drop it.
    pub fn mark_started(&mut self, id: &Uuid) -> bool {
        match self.jobs.get_mut(id) {
            Some(job) if matches!(job.state, JobState::Pending | JobState::Retry) => {
                job.state = JobState::Started;
                true
            }
            _ => false,
        }
    }

    /// After an inaccessible-target failure, advance to the next candidate
    /// mesh. The failed mesh moves to the attempted list and the retry
    /// counter increments.
    pub fn next_fallback(&mut self, id: &Uuid) -> FallbackOutcome {
        let Some(job) = self.jobs.get_mut(id) else {
            return FallbackOutcome::Halted;
        };
        if job.state != JobState::Started {
            return FallbackOutcome::Halted;
        }
        if job.pending_meshes.is_empty() {
            return FallbackOutcome::Exhausted;
        }
        let next = job.pending_meshes.remove(0);
        let failed = std::mem::replace(&mut job.current_mesh, next);
        job.attempted_meshes.push(failed);
        job.retries += 1;
        job.state = JobState::Retry;
        FallbackOutcome::Retry(next)
    }

    /// Record a successful completion. Refused when the job already reached
    /// a terminal state, so a concurrent revoke wins.
    pub fn complete_success(&mut self, id: &Uuid) -> bool {
        match self.jobs.get_mut(id) {
            Some(job) if !job.state.is_terminal() => {
                job.state = JobState::Success;
                job.completed_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Record a failure. The error always names every mesh attempted,
    /// including the one that just failed.
    pub fn complete_failure(&mut self, id: &Uuid, message: impl Into<String>) -> bool {
        match self.jobs.get_mut(id) {
            Some(job) if !job.state.is_terminal() => {
                let mut attempted = job.attempted_meshes.clone();
                attempted.push(job.current_mesh);
                job.error = Some(JobFailure {
                    message: message.into(),
                    attempted_meshes: attempted,
                });
                job.state = JobState::Failure;
                job.completed_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Cancel a job. Only non-terminal jobs can be revoked; revocation of a
    /// running job is cooperative, the worker notices at its next checkpoint.
    pub fn revoke(&mut self, id: &Uuid) -> bool {
        match self.jobs.get_mut(id) {
            Some(job) if !job.state.is_terminal() => {
                job.state = JobState::Revoked;
                job.completed_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Most recently created job for a route, if any.
    pub fn latest_job_for_route(&self, route_id: &Uuid) -> Option<&Job> {
        self.jobs
            .values()
            .filter(|j| j.route_id == *route_id)
            .max_by_key(|j| j.created)
    }

    /// Jobs created within the trailing window, newest first.
    pub fn recent(&self, window: Duration) -> Vec<&Job> {
        let cutoff = Utc::now() - window;
        let mut jobs: Vec<&Job> = self.jobs.values().filter(|j| j.created >= cutoff).collect();
        jobs.sort_by_key(|j| std::cmp::Reverse(j.created));
        jobs
    }

    pub fn all(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();
        jobs.sort_by_key(|j| j.created);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Backdate helper for tests that need jobs outside the recency window.
#[cfg(test)]
impl JobStore {
    pub(crate) fn set_created(&mut self, id: &Uuid, created: chrono::DateTime<Utc>) {
        if let Some(job) = self.jobs.get_mut(id) {
            job.created = created;
        }
    }
}
