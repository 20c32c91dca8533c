//! Error types for ProfessorAgent.
//!
//! Library crates use [`ProfessorAgentError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ProfessorAgent operations.
#[derive(Debug, thiserror::Error)]
pub enum ProfessorAgentError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to an external service.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed payload from a file or an external service.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A required resource (corpus file, job, ...) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// LLM generation error (API, empty response).
    #[error("generation error: {0}")]
    Generation(String),

    /// A step action failed while running a job.
    #[error("job error: {0}")]
    Job(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, inconsistent template, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ProfessorAgentError>;

impl ProfessorAgentError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
