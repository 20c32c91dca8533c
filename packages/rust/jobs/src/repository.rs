//! Job storage.
//!
//! [`JobRepository`] is the seam between the orchestrator and wherever job
//! records live. [`InMemoryJobRepository`] keeps every job in one
//! mutex-guarded map for the lifetime of the process.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::model::{Job, JobId, JobPayload, Status};

/// Error stored when a job fails without a message.
pub const DEFAULT_FAILURE: &str = "job failed";

/// Atomic job record operations.
///
/// Every `set_*` method is a no-op for unknown ids (and, for `set_step`,
/// unknown step names) and returns whether the write was applied. Backward
/// status transitions are refused.
pub trait JobRepository: Send + Sync {
    /// Step names every new job starts with.
    fn template(&self) -> &[String];

    /// Create a job with the repository's step template, all steps queued.
    fn create(&self, payload: JobPayload) -> JobId;

    /// An independent snapshot of the job.
    fn get(&self, id: JobId) -> Option<Job>;

    /// Claim a job for execution: move it from `queued` to `running`.
    ///
    /// Returns `false` if the job is unknown or has already left `queued`, so
    /// at most one caller ever wins for a given job.
    fn start(&self, id: JobId) -> bool;

    /// Set the job status. `error` is recorded only for [`Status::Failed`].
    fn set_status(&self, id: JobId, status: Status, error: Option<String>) -> bool;

    /// Set a step's status and overwrite its message.
    fn set_step(&self, id: JobId, step: &str, status: Status, message: Option<String>) -> bool;

    /// Insert or replace the artifact stored under `key`.
    fn set_artifact(&self, id: JobId, key: &str, artifact: Artifact) -> bool;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

pub struct InMemoryJobRepository {
    template: Vec<String>,
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl InMemoryJobRepository {
    pub fn new(template: Vec<String>) -> Self {
        Self {
            template,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Writers hold the lock only for plain field assignments, so a poisoned
    // map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JobRepository for InMemoryJobRepository {
    fn template(&self) -> &[String] {
        &self.template
    }

    fn create(&self, payload: JobPayload) -> JobId {
        let mut jobs = self.lock();
        let mut id = Uuid::now_v7();
        while jobs.contains_key(&id) {
            id = Uuid::now_v7();
        }
        jobs.insert(id, Job::new(id, payload, &self.template));
        debug!(job_id = %id, steps = self.template.len(), "job created");
        id
    }

    fn get(&self, id: JobId) -> Option<Job> {
        self.lock().get(&id).cloned()
    }

    fn start(&self, id: JobId) -> bool {
        let mut jobs = self.lock();
        match jobs.get_mut(&id) {
            Some(job) if job.status == Status::Queued => {
                job.status = Status::Running;
                job.updated_at = Utc::now();
                true
            }
            Some(job) => {
                debug!(job_id = %id, status = %job.status, "job already claimed");
                false
            }
            None => false,
        }
    }

    fn set_status(&self, id: JobId, status: Status, error: Option<String>) -> bool {
        let mut jobs = self.lock();
        let Some(job) = jobs.get_mut(&id) else {
            return false;
        };

        if !job.status.can_transition_to(status) {
            warn!(job_id = %id, from = %job.status, to = %status, "refused backward job transition");
            return false;
        }

        job.status = status;
        job.error = match status {
            Status::Failed => Some(error.unwrap_or_else(|| DEFAULT_FAILURE.to_string())),
            _ => None,
        };
        job.updated_at = Utc::now();
        true
    }

    fn set_step(&self, id: JobId, step: &str, status: Status, message: Option<String>) -> bool {
        let mut jobs = self.lock();
        let Some(job) = jobs.get_mut(&id) else {
            return false;
        };
        let Some(entry) = job.step_mut(step) else {
            debug!(job_id = %id, step, "set_step for unknown step ignored");
            return false;
        };

        if !entry.status.can_transition_to(status) {
            warn!(job_id = %id, step, from = %entry.status, to = %status, "refused backward step transition");
            return false;
        }

        entry.status = status;
        entry.message = message;
        job.updated_at = Utc::now();
        true
    }

    fn set_artifact(&self, id: JobId, key: &str, artifact: Artifact) -> bool {
        let mut jobs = self.lock();
        let Some(job) = jobs.get_mut(&id) else {
            return false;
        };
        job.artifacts.insert(key.to_string(), artifact);
        job.updated_at = Utc::now();
        true
    }
}
