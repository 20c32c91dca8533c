//! Job and step records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::Artifact;

pub type JobId = Uuid;

/// Fallback query when a payload has neither a goal nor a project idea.
pub const DEFAULT_QUERY: &str = "research topic";

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status shared by jobs and steps.
///
/// Transitions only move forward: `queued -> running -> {done, failed}`.
/// `queued` may also jump straight to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Queued,
    Running,
    Done,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Done | Self::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` is allowed. Re-applying the
    /// current status is allowed so messages can be refreshed.
    pub fn can_transition_to(&self, next: Status) -> bool {
        *self == next || next.rank() > self.rank()
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The request parameters a job was submitted with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub goal: String,
    #[serde(default)]
    pub profile_text: Option<String>,
    #[serde(default)]
    pub project_idea: Option<String>,
}

impl JobPayload {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ..Self::default()
        }
    }

    /// Search query for retrieval and literature steps: the goal, else the
    /// project idea, else [`DEFAULT_QUERY`].
    pub fn query(&self) -> &str {
        let non_blank = |s: &str| !s.trim().is_empty();
        if non_blank(&self.goal) {
            &self.goal
        } else {
            match self.project_idea.as_deref() {
                Some(idea) if non_blank(idea) => idea,
                _ => DEFAULT_QUERY,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Step / Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub status: Status,
    #[serde(default)]
    pub message: Option<String>,
}

impl Step {
    pub fn queued(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Status::Queued,
            message: None,
        }
    }
}

/// A job record. Snapshots handed out by a repository are independent
/// clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: Status,
    pub payload: JobPayload,
    pub steps: Vec<Step>,
    pub artifacts: BTreeMap<String, Artifact>,
    /// Set iff `status` is `failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, payload: JobPayload, step_names: &[String]) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: Status::Queued,
            payload,
            steps: step_names.iter().map(Step::queued).collect(),
            artifacts: BTreeMap::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub(crate) fn step_mut(&mut self, name: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.name == name)
    }

    /// The step currently running, if any.
    pub fn current_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.status == Status::Running)
    }
}
