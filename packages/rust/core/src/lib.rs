//! Job orchestration for ProfessorAgent.
//!
//! Ties the document index, the literature aggregator, and the generation
//! client together into multi-step jobs:
//! - [`steps`]: step kinds, built-in actions, and the action registry
//! - [`orchestrator`]: runs one job's steps in order
//! - [`service`]: submit/status facade over a bounded worker pool
//! - [`generation`]: OpenRouter and mock text generators

pub mod generation;
pub mod orchestrator;
pub mod service;
pub mod steps;

pub use generation::{
    Generator, MockGenerator, OpenRouterGenerator, generator_from_config, parse_generated,
};
pub use orchestrator::{NO_ACTION_MESSAGE, Orchestrator};
pub use service::{JOB_NOT_FOUND, JobReport, JobService, ReportStatus};
pub use steps::{ActionRegistry, BuiltinDeps, StepAction, StepContext, StepKind};
