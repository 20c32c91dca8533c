//! Core domain types shared across ProfessorAgent crates.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SourceTag
// ---------------------------------------------------------------------------

/// Origin of a [`Paper`]. Declaration order is the aggregator's priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    OpenAlex,
    Crossref,
    Arxiv,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAlex => "openalex",
            Self::Crossref => "crossref",
            Self::Arxiv => "arxiv",
        }
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Paper
// ---------------------------------------------------------------------------

/// A normalized record from an external literature source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    pub source: SourceTag,
    pub title: String,
    /// Author display names in source order.
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<i64>,
    /// Journal, conference, or repository name.
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    /// Landing page.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
}

impl Paper {
    /// The key used to recognize the same work across sources.
    ///
    /// Lower-cased, trimmed DOI when present; otherwise the lower-cased title
    /// with everything but letters, digits and underscores removed.
    pub fn dedup_key(&self) -> String {
        match self.doi.as_deref() {
            Some(doi) if !doi.is_empty() => doi.to_lowercase().trim().to_string(),
            _ => self
                .title
                .to_lowercase()
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect(),
        }
    }
}

/// Keep the first paper for each dedup key, preserving input order.
pub fn dedup_papers(papers: Vec<Paper>) -> Vec<Paper> {
    let mut seen = HashSet::new();
    papers
        .into_iter()
        .filter(|p| seen.insert(p.dedup_key()))
        .collect()
}
