//! Multi-source literature fan-out with per-source failure isolation.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use professoragent_shared::{
    LiteratureConfig, Paper, ProfessorAgentError, Result, SourceTag, dedup_papers,
};

use crate::sources::{ArxivSource, CrossrefSource, LiteratureSource, OpenAlexSource};

/// User-Agent sent to every literature API.
pub const USER_AGENT: &str = concat!("ProfessorAgent/", env!("CARGO_PKG_VERSION"));

/// Warning attached to a response with no results at all.
pub const NO_RESULTS_WARNING: &str = "No results found for this query. Try a broader keyword.";

// ---------------------------------------------------------------------------
// Options and response types
// ---------------------------------------------------------------------------

/// Per-call limits applied to every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub max_results_per_source: usize,
    pub timeout: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results_per_source: 5,
            timeout: Duration::from_secs(25),
        }
    }
}

impl From<&LiteratureConfig> for SearchOptions {
    fn from(config: &LiteratureConfig) -> Self {
        Self {
            max_results_per_source: config.max_results_per_source,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// What one source contributed to a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Ok { count: usize },
    Empty,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: SourceTag,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
}

/// Merged, deduplicated results plus per-source outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteratureResponse {
    pub query: String,
    pub results: Vec<Paper>,
    pub sources: Vec<SourceReport>,
    pub warning: Option<String>,
}

impl LiteratureResponse {
    fn failed_sources(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|r| matches!(r.outcome, SourceOutcome::Failed { .. }))
            .map(|r| r.source.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Queries every configured source concurrently and merges results in
/// source priority order.
///
/// The aggregator holds no mutable state and is shared behind an `Arc`.
pub struct LiteratureAggregator {
    sources: Vec<Arc<dyn LiteratureSource>>,
}

impl LiteratureAggregator {
    /// Build the default OpenAlex, Crossref, arXiv chain from config.
    pub fn new(config: &LiteratureConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProfessorAgentError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_sources(vec![
            Arc::new(OpenAlexSource::new(client.clone(), config.openalex_url.clone())),
            Arc::new(CrossrefSource::new(
                client.clone(),
                config.crossref_url.clone(),
                config.mailto.clone(),
            )),
            Arc::new(ArxivSource::new(client, config.arxiv_url.clone())),
        ]))
    }

    /// Use an explicit source list. Order is dedup priority.
    pub fn with_sources(sources: Vec<Arc<dyn LiteratureSource>>) -> Self {
        Self { sources }
    }

    pub fn source_tags(&self) -> Vec<SourceTag> {
        self.sources.iter().map(|s| s.tag()).collect()
    }

    /// Search every source. Never fails: a source error is recorded in its
    /// [`SourceReport`] and contributes no papers.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn search(&self, query: &str, options: SearchOptions) -> LiteratureResponse {
        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                let query = query.to_string();
                tokio::spawn(async move {
                    source
                        .search(&query, options.max_results_per_source, options.timeout)
                        .await
                })
            })
            .collect();

        let mut merged = Vec::new();
        let mut reports = Vec::with_capacity(handles.len());

        // Await in priority order so concatenation is deterministic.
        for (source, handle) in self.sources.iter().zip(handles) {
            let tag = source.tag();
            let outcome = match handle.await {
                Ok(Ok(papers)) if papers.is_empty() => SourceOutcome::Empty,
                Ok(Ok(papers)) => {
                    let count = papers.len();
                    merged.extend(papers);
                    SourceOutcome::Ok { count }
                }
                Ok(Err(e)) => {
                    warn!(source = %tag, error = %e, "literature source failed");
                    SourceOutcome::Failed {
                        error: e.to_string(),
                    }
                }
                Err(e) => {
                    warn!(source = %tag, error = %e, "literature source task aborted");
                    SourceOutcome::Failed {
                        error: format!("source task aborted: {e}"),
                    }
                }
            };
            reports.push(SourceReport {
                source: tag,
                outcome,
            });
        }

        let total = merged.len();
        let results = dedup_papers(merged);
        info!(total, unique = results.len(), "literature search complete");

        let mut response = LiteratureResponse {
            query: query.to_string(),
            results,
            sources: reports,
            warning: None,
        };
        response.warning = build_warning(&response);
        response
    }
}

fn build_warning(response: &LiteratureResponse) -> Option<String> {
    let failed = response.failed_sources();
    match (response.results.is_empty(), failed.is_empty()) {
        (true, true) => Some(NO_RESULTS_WARNING.to_string()),
        (true, false) => Some(format!(
            "{NO_RESULTS_WARNING} Sources unavailable: {}",
            failed.join(", ")
        )),
        (false, false) => Some(format!("Some sources unavailable: {}", failed.join(", "))),
        (false, true) => None,
    }
}
