//! Job service facade: submit jobs and poll their status.
//!
//! Submission creates the job record and enqueues its id; a dispatcher task
//! hands queued ids to worker tasks, at most `max_concurrent_jobs` at a time.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, instrument};

use professoragent_jobs::{
    Artifact, InMemoryJobRepository, Job, JobId, JobPayload, JobRepository, Status, Step,
};
use professoragent_literature::{LiteratureAggregator, SearchOptions};
use professoragent_retrieval::DocumentIndex;
use professoragent_shared::{AppConfig, ProfessorAgentError, Result};

use crate::generation::generator_from_config;
use crate::orchestrator::{Orchestrator, join_message};
use crate::steps::{ActionRegistry, BuiltinDeps};

/// Error reported for ids the service has never seen.
pub const JOB_NOT_FOUND: &str = "Job not found";

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Status as reported to callers; adds `not_found` to the job lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Queued,
    Running,
    Done,
    Failed,
    NotFound,
}

impl From<Status> for ReportStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Queued => Self::Queued,
            Status::Running => Self::Running,
            Status::Done => Self::Done,
            Status::Failed => Self::Failed,
        }
    }
}

impl ReportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::NotFound)
    }
}

/// Snapshot of a job returned by [`JobService::submit`] and
/// [`JobService::status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub status: ReportStatus,
    pub steps: Vec<Step>,
    pub artifacts: BTreeMap<String, Artifact>,
    pub error: Option<String>,
}

impl JobReport {
    pub fn not_found(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: ReportStatus::NotFound,
            steps: Vec::new(),
            artifacts: BTreeMap::new(),
            error: Some(JOB_NOT_FOUND.to_string()),
        }
    }

    /// The step currently running, if any.
    pub fn current_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.status == Status::Running)
    }
}

impl From<Job> for JobReport {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status.into(),
            steps: job.steps,
            artifacts: job.artifacts,
            error: job.error,
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Front door for jobs. Must be constructed inside a Tokio runtime.
pub struct JobService {
    repo: Arc<dyn JobRepository>,
    queue: mpsc::UnboundedSender<JobId>,
}

impl JobService {
    /// Start a service over `repo`.
    ///
    /// Fails if the repository's step template names a step without a
    /// registered action, or if `max_concurrent_jobs` is zero.
    pub fn new(
        repo: Arc<dyn JobRepository>,
        registry: ActionRegistry,
        max_concurrent_jobs: usize,
    ) -> Result<Self> {
        if max_concurrent_jobs == 0 {
            return Err(ProfessorAgentError::config(
                "max_concurrent_jobs must be at least 1",
            ));
        }
        registry.validate(repo.template())?;

        let orchestrator = Orchestrator::new(Arc::clone(&repo), Arc::new(registry));
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(
            rx,
            orchestrator,
            Arc::clone(&repo),
            max_concurrent_jobs,
        ));

        info!(
            max_concurrent_jobs,
            steps = repo.template().len(),
            "job service started"
        );
        Ok(Self { repo, queue })
    }

    /// Build the full service from config: load the corpus, set up the
    /// literature sources and generator, and register the built-in actions.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let index = Arc::new(DocumentIndex::load(&config.corpus.path)?);
        info!(documents = index.len(), path = %config.corpus.path.display(), "corpus loaded");

        let deps = BuiltinDeps {
            index,
            literature: Arc::new(LiteratureAggregator::new(&config.literature)?),
            generator: generator_from_config(config)?,
            retrieval_top_k: config.jobs.retrieval_top_k,
            search_options: SearchOptions::from(&config.literature),
        };
        let repo = Arc::new(InMemoryJobRepository::new(config.jobs.steps.clone()));
        Self::new(
            repo,
            ActionRegistry::builtin(deps),
            config.jobs.max_concurrent_jobs,
        )
    }

    /// Create a job and queue it. Returns before any step runs.
    #[instrument(skip_all)]
    pub fn submit(&self, payload: JobPayload) -> Result<JobReport> {
        let id = self.repo.create(payload);
        let report = self
            .repo
            .get(id)
            .map(JobReport::from)
            .ok_or_else(|| ProfessorAgentError::NotFound(format!("job {id} vanished")))?;

        if self.queue.send(id).is_err() {
            let reason = "job queue is closed";
            self.repo
                .set_status(id, Status::Failed, Some(reason.to_string()));
            return Err(ProfessorAgentError::Job(reason.to_string()));
        }
        info!(job_id = %id, "job submitted");
        Ok(report)
    }

    /// Latest snapshot of a job. Unknown or malformed ids yield a
    /// `not_found` report.
    pub fn status(&self, job_id: &str) -> JobReport {
        job_id
            .parse::<JobId>()
            .ok()
            .and_then(|id| self.repo.get(id))
            .map(JobReport::from)
            .unwrap_or_else(|| JobReport::not_found(job_id))
    }

    pub fn repository(&self) -> Arc<dyn JobRepository> {
        Arc::clone(&self.repo)
    }
}

async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<JobId>,
    orchestrator: Orchestrator,
    repo: Arc<dyn JobRepository>,
    max_concurrent_jobs: usize,
) {
    let slots = Arc::new(Semaphore::new(max_concurrent_jobs));

    while let Some(job_id) = rx.recv().await {
        let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
            break;
        };
        debug!(job_id = %job_id, "dispatching job");

        let orchestrator = orchestrator.clone();
        let repo = Arc::clone(&repo);
        tokio::spawn(async move {
            let _permit = permit;
            let worker = tokio::spawn(async move { orchestrator.run(job_id).await });
            if let Err(join) = worker.await {
                let reason = format!("worker panicked: {}", join_message(join));
                error!(job_id = %job_id, error = %reason, "job worker crashed");
                repo.set_status(job_id, Status::Failed, Some(reason));
            }
        });
    }

    debug!("job queue closed, dispatcher exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::steps::{StepAction, StepContext, StepKind};

    async fn wait_terminal(service: &JobService, id: &str) -> JobReport {
        for _ in 0..200 {
            let report = service.status(id);
            if report.status.is_terminal() {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish");
    }

    /// Blocks until released, so tests can observe a job mid-flight.
    struct Gate {
        release: Arc<Notify>,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StepAction for Gate {
        async fn run(&self, ctx: &StepContext) -> professoragent_shared::Result<()> {
            ctx.running("waiting");
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.release.notified().await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            ctx.done("released");
            Ok(())
        }
    }

    struct Quick;

    #[async_trait]
    impl StepAction for Quick {
        async fn run(&self, ctx: &StepContext) -> professoragent_shared::Result<()> {
            ctx.running("quick");
            ctx.done("quick done");
            Ok(())
        }
    }

    fn repo(steps: &[&str]) -> Arc<dyn JobRepository> {
        Arc::new(InMemoryJobRepository::new(
            steps.iter().map(|s| s.to_string()).collect(),
        ))
    }

    #[tokio::test]
    async fn submit_returns_all_steps_queued() {
        let release = Arc::new(Notify::new());
        let mut registry = ActionRegistry::new();
        registry
            .register(
                StepKind::Grants,
                Gate {
                    release: release.clone(),
                    running: Arc::default(),
                    peak: Arc::default(),
                },
            )
            .register(StepKind::Collaborators, Quick)
            .register(StepKind::Proposal, Quick);

        let service = JobService::new(repo(&["grants", "collaborators", "proposal"]), registry, 2)
            .unwrap();
        let report = service.submit(JobPayload::new("goal")).unwrap();

        assert_eq!(report.status, ReportStatus::Queued);
        assert_eq!(
            report.steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["grants", "collaborators", "proposal"]
        );
        assert!(report.steps.iter().all(|s| s.status == Status::Queued));
        assert!(report.artifacts.is_empty());
        assert_eq!(report.error, None);

        // Observed statuses only ever move forward.
        let rank = |s: ReportStatus| match s {
            ReportStatus::Queued => 0,
            ReportStatus::Running => 1,
            _ => 2,
        };
        let mut last = rank(report.status);
        for _ in 0..20 {
            let now = rank(service.status(&report.job_id).status);
            assert!(now >= last);
            last = now;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        release.notify_one();
        let done = wait_terminal(&service, &report.job_id).await;
        assert_eq!(done.status, ReportStatus::Done);
        assert!(done.steps.iter().all(|s| s.status == Status::Done));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let mut registry = ActionRegistry::new();
        registry.register(StepKind::Grants, Quick);
        let service = JobService::new(repo(&["grants"]), registry, 1).unwrap();

        let report = service.status("not-a-uuid");
        assert_eq!(report.status, ReportStatus::NotFound);
        assert_eq!(report.error.as_deref(), Some(JOB_NOT_FOUND));
        assert_eq!(report.job_id, "not-a-uuid");
        assert!(report.steps.is_empty());

        let ghost = JobId::now_v7().to_string();
        assert_eq!(service.status(&ghost).status, ReportStatus::NotFound);
    }

    #[tokio::test]
    async fn template_without_action_is_rejected_up_front() {
        let mut registry = ActionRegistry::new();
        registry.register(StepKind::Grants, Quick);
        let err = JobService::new(repo(&["grants", "slides"]), registry, 1)
            .err()
            .expect("construction should fail");
        assert!(matches!(err, ProfessorAgentError::Config { .. }));
    }

    #[tokio::test]
    async fn zero_workers_is_rejected() {
        let mut registry = ActionRegistry::new();
        registry.register(StepKind::Grants, Quick);
        assert!(JobService::new(repo(&["grants"]), registry, 0).is_err());
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let release = Arc::new(Notify::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = ActionRegistry::new();
        registry.register(
            StepKind::Grants,
            Gate {
                release: release.clone(),
                running: running.clone(),
                peak: peak.clone(),
            },
        );
        let service = JobService::new(repo(&["grants"]), registry, 2).unwrap();

        let ids: Vec<String> = (0..5)
            .map(|i| service.submit(JobPayload::new(format!("goal {i}"))).unwrap().job_id)
            .collect();

        // Let the first wave start.
        for _ in 0..100 {
            if running.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(running.load(Ordering::SeqCst), 2);

        let queued = ids
            .iter()
            .filter(|id| service.status(id).status == ReportStatus::Queued)
            .count();
        assert_eq!(queued, 3);

        // Release jobs one at a time until all are done.
        for id in &ids {
            loop {
                let status = service.status(id).status;
                if status.is_terminal() {
                    break;
                }
                release.notify_one();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        for id in &ids {
            assert_eq!(service.status(id).status, ReportStatus::Done);
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn report_serializes_not_found() {
        let json = serde_json::to_value(JobReport::not_found("abc")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "job_id": "abc",
                "status": "not_found",
                "steps": [],
                "artifacts": {},
                "error": "Job not found"
            })
        );
    }

    #[tokio::test]
    async fn from_config_loads_fixture_corpus() {
        let mut config = AppConfig::default();
        config.corpus.path = "../../../fixtures/corpus/agent_corpus.jsonl".into();
        config.openrouter.api_key_env = "PROFESSORAGENT_TEST_KEY_THAT_IS_NEVER_SET".into();
        let service = JobService::from_config(&config).expect("service");
        assert_eq!(service.repository().template().len(), 7);
    }

    #[tokio::test]
    async fn from_config_requires_corpus() {
        let mut config = AppConfig::default();
        config.corpus.path = "/definitely/missing/corpus.jsonl".into();
        let err = JobService::from_config(&config).err().expect("missing corpus");
        assert!(matches!(err, ProfessorAgentError::NotFound(_)));
    }
}
