//! Shared types, error model, and configuration for ProfessorAgent.
//!
//! This crate is the foundation depended on by all other ProfessorAgent crates.
//! It provides:
//! - The unified error type, [`ProfessorAgentError`]
//! - Domain types ([`Paper`], [`SourceTag`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CorpusConfig, DEFAULT_STEPS, JobsConfig, LiteratureConfig, OpenRouterConfig,
    config_dir, config_file_path, endpoint, init_config, load_config, load_config_from,
    resolve_api_key, validate_config,
};
pub use error::{ProfessorAgentError, Result};
pub use types::{Paper, SourceTag, dedup_papers};
