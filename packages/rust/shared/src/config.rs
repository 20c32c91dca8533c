//! Application configuration for ProfessorAgent.
//!
//! User config lives at `~/.professoragent/professoragent.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ProfessorAgentError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "professoragent.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".professoragent";

/// Step names of the built-in workflow, in execution order.
pub const DEFAULT_STEPS: [&str; 7] = [
    "context_retrieval",
    "lesson_plan",
    "slides",
    "grants",
    "collaborators",
    "literature",
    "proposal",
];

// ---------------------------------------------------------------------------
// Config structs (matching professoragent.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// OpenRouter settings for the generation steps.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Local retrieval corpus.
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// External literature sources.
    #[serde(default)]
    pub literature: LiteratureConfig,

    /// Job execution.
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for every generation step.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// OpenAI-compatible API root.
    #[serde(default = "default_openrouter_url")]
    pub base_url: Url,

    /// Request timeout for a single completion.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_openrouter_url(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "Qwen/Qwen2.5-32B-Instruct".into()
}
fn default_openrouter_url() -> Url {
    parse_default_url("https://openrouter.ai/api/v1/")
}
fn default_generation_timeout() -> u64 {
    60
}

/// `[corpus]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// JSON-lines corpus file loaded by the document index.
    #[serde(default = "default_corpus_path")]
    pub path: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: default_corpus_path(),
        }
    }
}

fn default_corpus_path() -> PathBuf {
    PathBuf::from("artifacts").join("agent_corpus.jsonl")
}

/// `[literature]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteratureConfig {
    #[serde(default = "default_openalex_url")]
    pub openalex_url: Url,

    #[serde(default = "default_crossref_url")]
    pub crossref_url: Url,

    #[serde(default = "default_arxiv_url")]
    pub arxiv_url: Url,

    /// Contact address sent to Crossref (polite pool).
    #[serde(default = "default_mailto")]
    pub mailto: String,

    /// Maximum results requested from each source.
    #[serde(default = "default_max_results")]
    pub max_results_per_source: usize,

    /// Per-request timeout for each source.
    #[serde(default = "default_literature_timeout")]
    pub timeout_secs: u64,
}

impl Default for LiteratureConfig {
    fn default() -> Self {
        Self {
            openalex_url: default_openalex_url(),
            crossref_url: default_crossref_url(),
            arxiv_url: default_arxiv_url(),
            mailto: default_mailto(),
            max_results_per_source: default_max_results(),
            timeout_secs: default_literature_timeout(),
        }
    }
}

fn default_openalex_url() -> Url {
    parse_default_url("https://api.openalex.org/")
}
fn default_crossref_url() -> Url {
    parse_default_url("https://api.crossref.org/")
}
fn default_arxiv_url() -> Url {
    parse_default_url("http://export.arxiv.org/")
}
fn default_mailto() -> String {
    "you@example.com".into()
}
fn default_max_results() -> usize {
    5
}
fn default_literature_timeout() -> u64 {
    25
}

/// `[jobs]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Jobs allowed to execute at the same time.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Hits per source type returned by the context retrieval step.
    #[serde(default = "default_top_k")]
    pub retrieval_top_k: usize,

    /// Ordered step names every new job is created with.
    #[serde(default = "default_steps")]
    pub steps: Vec<String>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            retrieval_top_k: default_top_k(),
            steps: default_steps(),
        }
    }
}

fn default_max_concurrent_jobs() -> usize {
    4
}
fn default_top_k() -> usize {
    5
}
fn default_steps() -> Vec<String> {
    DEFAULT_STEPS.iter().map(|s| (*s).to_string()).collect()
}

fn parse_default_url(raw: &str) -> Url {
    Url::parse(raw).expect("built-in default URL is valid")
}

/// Resolve `path` below a configured API root.
///
/// The root is treated as a directory whether or not it ends in `/`, so
/// `https://host/api/v1` and `https://host/api/v1/` resolve alike.
pub fn endpoint(base: &Url, path: &str) -> Result<Url> {
    let mut root = base.clone();
    if !root.path().ends_with('/') {
        let with_slash = format!("{}/", root.path());
        root.set_path(&with_slash);
    }
    root.join(path.trim_start_matches('/')).map_err(|e| {
        ProfessorAgentError::config(format!("invalid endpoint {base} + {path}: {e}"))
    })
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.professoragent/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ProfessorAgentError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.professoragent/professoragent.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ProfessorAgentError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ProfessorAgentError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ProfessorAgentError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config)
        .map_err(|e| ProfessorAgentError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ProfessorAgentError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject values that would make the service unusable.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.jobs.max_concurrent_jobs == 0 {
        return Err(ProfessorAgentError::config(
            "jobs.max_concurrent_jobs must be at least 1",
        ));
    }
    if config.jobs.steps.is_empty() {
        return Err(ProfessorAgentError::config("jobs.steps must not be empty"));
    }
    let mut seen = std::collections::HashSet::new();
    for step in &config.jobs.steps {
        if !seen.insert(step.as_str()) {
            return Err(ProfessorAgentError::config(format!(
                "jobs.steps lists '{step}' more than once"
            )));
        }
    }
    Ok(())
}

/// Read the OpenRouter API key from the configured env var.
///
/// Returns `None` when the variable is unset or blank; generation then runs
/// against the mock generator.
pub fn resolve_api_key(config: &AppConfig) -> Option<String> {
    std::env::var(&config.openrouter.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
}
