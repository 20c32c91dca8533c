//! Local document index with token-overlap search.
//!
//! The index is loaded once from a JSON-lines corpus and never mutated
//! afterwards, so it can be shared across jobs behind an `Arc` without locking.
//!
//! Scoring is the size of the intersection between the query's token set and
//! the document's token set. There is no term-frequency weighting, no length
//! normalization and no stemming; ties keep corpus order.

use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use professoragent_shared::{ProfessorAgentError, Result};

/// Characters of document text returned as a hit's snippet.
pub const SNIPPET_CHARS: usize = 300;

// ---------------------------------------------------------------------------
// Corpus records
// ---------------------------------------------------------------------------

/// Metadata attached to a corpus entry. Used for filtering, never for scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub doc_id: serde_json::Value,
    /// e.g. `faculty_profile` or `grant`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    /// Any further keys from the corpus line, returned verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One line of the corpus file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

/// A scored search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Number of distinct query tokens found in the document.
    pub score: usize,
    pub snippet: String,
    pub metadata: DocumentMetadata,
}

// ---------------------------------------------------------------------------
// DocumentIndex
// ---------------------------------------------------------------------------

struct IndexedDocument {
    document: Document,
    tokens: HashSet<String>,
}

/// Immutable in-memory index over the whole corpus.
pub struct DocumentIndex {
    docs: Vec<IndexedDocument>,
}

impl DocumentIndex {
    /// Load every non-blank line of the corpus at `path`.
    ///
    /// A missing file is reported as [`ProfessorAgentError::NotFound`]; a line
    /// that is not a valid corpus record fails the whole load.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ProfessorAgentError::NotFound(format!(
                "corpus not found: {}",
                path.display()
            )));
        }

        let file = std::fs::File::open(path).map_err(|e| ProfessorAgentError::io(path, e))?;
        let mut documents = Vec::new();

        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| ProfessorAgentError::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let doc: Document = serde_json::from_str(&line).map_err(|e| {
                ProfessorAgentError::parse(format!(
                    "{}:{}: invalid corpus record: {e}",
                    path.display(),
                    i + 1
                ))
            })?;
            documents.push(doc);
        }

        let index = Self::from_documents(documents);
        info!(documents = index.len(), "corpus loaded");
        Ok(index)
    }

    /// Build an index from already-parsed documents, keeping their order.
    pub fn from_documents(documents: Vec<Document>) -> Self {
        let docs = documents
            .into_iter()
            .map(|document| IndexedDocument {
                tokens: tokenize(&document.text),
                document,
            })
            .collect();
        Self { docs }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Rank documents by token overlap with `query`.
    ///
    /// An empty `source_type` filter is treated as no filter.
    pub fn search(&self, query: &str, top_k: usize, source_type: Option<&str>) -> Vec<SearchHit> {
        let query_tokens = tokenize(query);
        let filter = source_type.filter(|s| !s.is_empty());

        let mut scored: Vec<(usize, &Document)> = self
            .docs
            .iter()
            .filter(|d| match filter {
                Some(wanted) => d.document.metadata.source_type.as_deref() == Some(wanted),
                None => true,
            })
            .map(|d| (query_tokens.intersection(&d.tokens).count(), &d.document))
            .filter(|(score, _)| *score > 0)
            .collect();

        // `sort_by` is stable: equal scores keep corpus order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        debug!(
            query,
            matched = scored.len(),
            top_k,
            source_type = filter.unwrap_or("*"),
            "index search"
        );

        scored
            .into_iter()
            .take(top_k)
            .map(|(score, doc)| SearchHit {
                score,
                snippet: snippet(&doc.text),
                metadata: doc.metadata.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Split text into its set of lower-cased `[A-Za-z0-9_]+` tokens.
pub fn tokenize(text: &str) -> HashSet<String> {
    static WORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[A-Za-z0-9_]+").expect("valid regex"));

    WORD_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn snippet(text: &str) -> String {
    text.chars()
        .take(SNIPPET_CHARS)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect()
}
