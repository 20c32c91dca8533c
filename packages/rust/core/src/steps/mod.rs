//! Step kinds, the per-step execution context, and the action registry.

mod actions;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use professoragent_jobs::{Artifact, JobId, JobPayload, JobRepository, Status};
use professoragent_shared::{ProfessorAgentError, Result};

pub use actions::{
    BuiltinDeps, CollaboratorsAction, ContextRetrievalAction, GenerationAction, GrantsAction,
    LiteratureAction,
};

// ---------------------------------------------------------------------------
// StepKind
// ---------------------------------------------------------------------------

/// Every step a job template may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    ContextRetrieval,
    LessonPlan,
    Slides,
    Grants,
    Collaborators,
    Literature,
    Proposal,
}

impl StepKind {
    pub const ALL: [StepKind; 7] = [
        Self::ContextRetrieval,
        Self::LessonPlan,
        Self::Slides,
        Self::Grants,
        Self::Collaborators,
        Self::Literature,
        Self::Proposal,
    ];

    /// Step name as used in templates and as the artifact key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContextRetrieval => "context_retrieval",
            Self::LessonPlan => "lesson_plan",
            Self::Slides => "slides",
            Self::Grants => "grants",
            Self::Collaborators => "collaborators",
            Self::Literature => "literature",
            Self::Proposal => "proposal",
        }
    }
}

impl FromStr for StepKind {
    type Err = ProfessorAgentError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ProfessorAgentError::config(format!("unknown step '{s}'")))
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StepContext
// ---------------------------------------------------------------------------

/// What an action sees while it runs: its job, its step, and write access to
/// that step's state in the repository.
pub struct StepContext {
    job_id: JobId,
    step: String,
    payload: JobPayload,
    repo: Arc<dyn JobRepository>,
}

impl StepContext {
    pub fn new(
        job_id: JobId,
        step: impl Into<String>,
        payload: JobPayload,
        repo: Arc<dyn JobRepository>,
    ) -> Self {
        Self {
            job_id,
            step: step.into(),
            payload,
            repo,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn step_name(&self) -> &str {
        &self.step
    }

    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    pub fn running(&self, message: impl Into<String>) {
        self.set(Status::Running, message);
    }

    pub fn done(&self, message: impl Into<String>) {
        self.set(Status::Done, message);
    }

    pub fn failed(&self, message: impl Into<String>) {
        self.set(Status::Failed, message);
    }

    /// Store this step's artifact under the step name.
    pub fn store(&self, artifact: Artifact) {
        self.repo.set_artifact(self.job_id, &self.step, artifact);
    }

    /// Artifact written earlier in this job by `kind`, if any.
    pub fn artifact_of(&self, kind: StepKind) -> Option<Artifact> {
        self.repo
            .get(self.job_id)
            .and_then(|mut job| job.artifacts.remove(kind.as_str()))
    }

    fn set(&self, status: Status, message: impl Into<String>) {
        self.repo
            .set_step(self.job_id, &self.step, status, Some(message.into()));
    }
}

// ---------------------------------------------------------------------------
// StepAction / ActionRegistry
// ---------------------------------------------------------------------------

/// The work behind one step.
///
/// Implementations mark the step running on entry and done on success. An
/// `Err` fails the whole job.
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn run(&self, ctx: &StepContext) -> Result<()>;
}

/// Maps step kinds to their actions.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<StepKind, Arc<dyn StepAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with an action for every [`StepKind`].
    pub fn builtin(deps: BuiltinDeps) -> Self {
        let mut registry = Self::new();
        registry.register(
            StepKind::ContextRetrieval,
            ContextRetrievalAction::new(deps.index.clone(), deps.retrieval_top_k),
        );
        for kind in [StepKind::LessonPlan, StepKind::Slides, StepKind::Proposal] {
            registry.register(kind, GenerationAction::new(kind, deps.generator.clone()));
        }
        registry.register(StepKind::Grants, GrantsAction);
        registry.register(StepKind::Collaborators, CollaboratorsAction);
        registry.register(
            StepKind::Literature,
            LiteratureAction::new(deps.literature.clone(), deps.search_options),
        );
        registry
    }

    /// Register (or replace) the action for `kind`.
    pub fn register(&mut self, kind: StepKind, action: impl StepAction + 'static) -> &mut Self {
        self.actions.insert(kind, Arc::new(action));
        self
    }

    pub fn get(&self, kind: StepKind) -> Option<Arc<dyn StepAction>> {
        self.actions.get(&kind).cloned()
    }

    /// Action for a template step name. Unknown names and unregistered kinds
    /// both resolve to `None`.
    pub fn lookup(&self, step_name: &str) -> Option<Arc<dyn StepAction>> {
        step_name.parse().ok().and_then(|kind| self.get(kind))
    }

    /// Check that every template step names a known kind with a registered
    /// action.
    pub fn validate(&self, template: &[String]) -> Result<()> {
        for name in template {
            let kind: StepKind = name.parse()?;
            if !self.actions.contains_key(&kind) {
                return Err(ProfessorAgentError::config(format!(
                    "no action registered for step '{name}'"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use professoragent_jobs::InMemoryJobRepository;
    use professoragent_shared::DEFAULT_STEPS;

    struct Noop;

    #[async_trait]
    impl StepAction for Noop {
        async fn run(&self, ctx: &StepContext) -> Result<()> {
            ctx.done("ok");
            Ok(())
        }
    }

    #[test]
    fn default_steps_all_parse() {
        let kinds: Vec<StepKind> = DEFAULT_STEPS.iter().map(|s| s.parse().unwrap()).collect();
        assert_eq!(kinds, StepKind::ALL.to_vec());
    }

    #[test]
    fn unknown_step_name_is_config_error() {
        let err = "teleport".parse::<StepKind>().unwrap_err();
        assert!(matches!(err, ProfessorAgentError::Config { .. }));
    }

    #[test]
    fn validate_reports_missing_action() {
        let mut registry = ActionRegistry::new();
        registry.register(StepKind::Grants, Noop);

        assert!(registry.validate(&["grants".to_string()]).is_ok());
        let err = registry
            .validate(&["grants".to_string(), "slides".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("slides"));
        assert!(registry.validate(&["bogus".to_string()]).is_err());
    }

    #[test]
    fn lookup_resolves_names() {
        let mut registry = ActionRegistry::new();
        registry.register(StepKind::Literature, Noop);
        assert!(registry.lookup("literature").is_some());
        assert!(registry.lookup("slides").is_none());
        assert!(registry.lookup("bogus").is_none());
    }

    #[test]
    fn context_writes_through_to_repository() {
        let repo: Arc<dyn JobRepository> =
            Arc::new(InMemoryJobRepository::new(vec!["grants".into()]));
        let id = repo.create(JobPayload::new("goal"));
        let ctx = StepContext::new(id, "grants", JobPayload::new("goal"), repo.clone());

        ctx.running("working");
        let job = repo.get(id).unwrap();
        assert_eq!(job.steps[0].status, Status::Running);
        assert_eq!(job.steps[0].message.as_deref(), Some("working"));

        ctx.store(Artifact::Grants(Default::default()));
        assert!(ctx.artifact_of(StepKind::Grants).is_some());
        assert!(ctx.artifact_of(StepKind::Slides).is_none());
    }
}
