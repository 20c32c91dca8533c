//! Literature source trait and the built-in source adapters.
//!
//! Each adapter queries one external API and maps its native response shape
//! into [`Paper`]. Missing or mistyped fields become `None` instead of failing
//! the whole response.

mod arxiv;
mod crossref;
mod openalex;

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use professoragent_shared::{Paper, ProfessorAgentError, Result, SourceTag};

pub use arxiv::ArxivSource;
pub use crossref::CrossrefSource;
pub use openalex::OpenAlexSource;

/// Upper bound on results requested from any single source.
pub const MAX_PAGE_SIZE: usize = 25;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One external paper search API.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Tag stamped on every paper this source returns.
    fn tag(&self) -> SourceTag;

    /// Search the source for `query`.
    ///
    /// Any error (network, HTTP status, malformed payload, timeout) is
    /// reported as `Err`; the aggregator turns it into an empty contribution.
    async fn search(&self, query: &str, max_results: usize, timeout: Duration)
    -> Result<Vec<Paper>>;
}

// ---------------------------------------------------------------------------
// Shared adapter helpers
// ---------------------------------------------------------------------------

/// Clamp a requested page size into `1..=MAX_PAGE_SIZE`.
pub(crate) fn page_size(max_results: usize) -> usize {
    max_results.clamp(1, MAX_PAGE_SIZE)
}

/// Collapse runs of whitespace and trim; blank input becomes `None`.
pub(crate) fn clean_text(s: Option<&str>) -> Option<String> {
    let collapsed = s?.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Replace markup tags with spaces and collapse the result.
///
/// Crossref abstracts carry JATS tags; arXiv summaries occasionally carry
/// HTML inside CDATA.
pub(crate) fn strip_markup(raw: &str) -> Option<String> {
    static MARKUP_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<[^>]+>").expect("markup regex is valid"));

    let stripped = MARKUP_RE.replace_all(raw, " ");
    clean_text(Some(&stripped))
}

/// Deserialize a field, turning any type mismatch into `None`.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

/// GET `url` with query parameters and return the body of a 2xx response.
pub(crate) async fn fetch_text(
    client: &Client,
    url: Url,
    params: &[(&str, String)],
    timeout: Duration,
) -> Result<String> {
    let response = client
        .get(url.clone())
        .query(params)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| ProfessorAgentError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProfessorAgentError::Network(format!("{url}: HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| ProfessorAgentError::Network(format!("{url}: failed to read body: {e}")))
}

/// Parse a JSON body, naming the source on failure.
pub(crate) fn parse_json<T: DeserializeOwned>(source: SourceTag, body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| ProfessorAgentError::parse(format!("{source}: malformed response: {e}")))
}
