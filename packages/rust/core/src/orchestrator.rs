//! Runs one job's steps in order.

use std::any::Any;
use std::sync::Arc;

use tokio::task::JoinError;
use tracing::{error, info, instrument, warn};

use professoragent_jobs::{JobId, JobRepository, Status};

use crate::steps::{ActionRegistry, StepContext};

/// Step message used when a template step has no registered action.
pub const NO_ACTION_MESSAGE: &str = "No action implemented";

/// Executes jobs against a repository and an action registry.
///
/// Each step action runs in its own task so a panic inside an action is
/// caught and recorded as a step failure.
#[derive(Clone)]
pub struct Orchestrator {
    repo: Arc<dyn JobRepository>,
    registry: Arc<ActionRegistry>,
}

impl Orchestrator {
    pub fn new(repo: Arc<dyn JobRepository>, registry: Arc<ActionRegistry>) -> Self {
        Self { repo, registry }
    }

    /// Run a queued job to completion and return its final status.
    ///
    /// Unknown jobs return `None`. A job that is not `queued` is left alone,
    /// so a job is never executed twice.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn run(&self, job_id: JobId) -> Option<Status> {
        let Some(job) = self.repo.get(job_id) else {
            warn!("job not found, nothing to run");
            return None;
        };
        if !self.repo.start(job_id) {
            let status = self.repo.get(job_id).map_or(job.status, |j| j.status);
            warn!(status = %status, "job already started, skipping");
            return Some(status);
        }
        info!(steps = job.steps.len(), "job started");

        for step in &job.steps {
            let name = step.name.as_str();
            let Some(action) = self.registry.lookup(name) else {
                self.repo.set_step(
                    job_id,
                    name,
                    Status::Failed,
                    Some(NO_ACTION_MESSAGE.to_string()),
                );
                return Some(self.fail(job_id, format!("No action implemented for step: {name}")));
            };

            let ctx = StepContext::new(job_id, name, job.payload.clone(), Arc::clone(&self.repo));
            let outcome = tokio::spawn(async move { action.run(&ctx).await }).await;

            let error = match outcome {
                Ok(Ok(())) => {
                    self.finish_step(job_id, name);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(join) => format!("step '{name}' panicked: {}", join_message(join)),
            };

            error!(step = name, error = %error, "step failed");
            self.fail_step(job_id, name, &error);
            return Some(self.fail(job_id, error));
        }

        self.repo.set_status(job_id, Status::Done, None);
        info!("job done");
        Some(Status::Done)
    }

    /// Mark a step done if its action returned without doing so.
    fn finish_step(&self, job_id: JobId, name: &str) {
        let pending = self
            .repo
            .get(job_id)
            .and_then(|job| job.step(name).map(|s| !s.status.is_terminal()))
            .unwrap_or(false);
        if pending {
            self.repo.set_step(job_id, name, Status::Done, None);
        }
    }

    /// Mark a step failed unless its action already recorded a terminal state.
    fn fail_step(&self, job_id: JobId, name: &str, error: &str) {
        let pending = self
            .repo
            .get(job_id)
            .and_then(|job| job.step(name).map(|s| !s.status.is_terminal()))
            .unwrap_or(false);
        if pending {
            self.repo
                .set_step(job_id, name, Status::Failed, Some(error.to_string()));
        }
    }

    fn fail(&self, job_id: JobId, error: String) -> Status {
        self.repo.set_status(job_id, Status::Failed, Some(error));
        Status::Failed
    }
}

/// Best-effort text for a failed task: the panic payload when it is a
/// string, otherwise the join error itself.
pub(crate) fn join_message(err: JoinError) -> String {
    if err.is_panic() {
        panic_text(err.into_panic())
    } else {
        err.to_string()
    }
}

fn panic_text(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(s) => (*s).to_string(),
            Err(_) => "unknown panic".to_string(),
        },
    }
}
