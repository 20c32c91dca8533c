//! Job records and the job repository for ProfessorAgent.
//!
//! A job is a fixed, ordered list of steps plus the artifacts those steps
//! produce. The repository is the only shared writable state in the system.

pub mod artifact;
pub mod model;
pub mod repository;

pub use artifact::{
    Artifact, CollaboratorMatch, CollaboratorMatches, ContextReport, ContextResults, Generated,
    GrantSuggestion, GrantSuggestions,
};
pub use model::{DEFAULT_QUERY, Job, JobId, JobPayload, Status, Step};
pub use repository::{DEFAULT_FAILURE, InMemoryJobRepository, JobRepository};
