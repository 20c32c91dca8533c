//! Typed step outputs stored on a job.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use professoragent_literature::LiteratureResponse;
use professoragent_retrieval::SearchHit;

/// Output written by one step, keyed on the job by step name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Artifact {
    ContextRetrieval(ContextReport),
    LessonPlan(Generated),
    Slides(Generated),
    Grants(GrantSuggestions),
    Collaborators(CollaboratorMatches),
    Literature(LiteratureResponse),
    Proposal(Generated),
}

impl Artifact {
    pub fn as_context(&self) -> Option<&ContextReport> {
        match self {
            Self::ContextRetrieval(report) => Some(report),
            _ => None,
        }
    }

    pub fn as_literature(&self) -> Option<&LiteratureResponse> {
        match self {
            Self::Literature(response) => Some(response),
            _ => None,
        }
    }

    pub fn as_generated(&self) -> Option<&Generated> {
        match self {
            Self::LessonPlan(g) | Self::Slides(g) | Self::Proposal(g) => Some(g),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Context retrieval
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextReport {
    pub query: String,
    pub top_k: usize,
    pub results: ContextResults,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextResults {
    pub faculty: Vec<SearchHit>,
    pub grants: Vec<SearchHit>,
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// A structured generation result.
///
/// When the model reply is not valid JSON the raw text is kept alongside a
/// fixed error marker, and the artifact is still stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Generated {
    Unparsed { error: String, raw_response: String },
    Parsed(Value),
}

impl Generated {
    pub const PARSE_FAILED: &'static str = "JSON parsing failed";

    pub fn unparsed(raw: impl Into<String>) -> Self {
        Self::Unparsed {
            error: Self::PARSE_FAILED.to_string(),
            raw_response: raw.into(),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }
}

// ---------------------------------------------------------------------------
// Grants / collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrantSuggestions {
    pub top_grants: Vec<GrantSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantSuggestion {
    pub doc_id: Value,
    pub agency: Option<String>,
    pub score: usize,
    pub summary: String,
}

impl From<&SearchHit> for GrantSuggestion {
    fn from(hit: &SearchHit) -> Self {
        Self {
            doc_id: hit.metadata.doc_id.clone(),
            agency: extra_str(hit, "agency"),
            score: hit.score,
            summary: hit.snippet.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorMatches {
    pub matches: Vec<CollaboratorMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorMatch {
    pub doc_id: Value,
    pub name: Option<String>,
    pub department: Option<String>,
    pub score: usize,
    pub snippet: String,
}

impl From<&SearchHit> for CollaboratorMatch {
    fn from(hit: &SearchHit) -> Self {
        Self {
            doc_id: hit.metadata.doc_id.clone(),
            name: extra_str(hit, "name"),
            department: extra_str(hit, "department"),
            score: hit.score,
            snippet: hit.snippet.clone(),
        }
    }
}

fn extra_str(hit: &SearchHit, key: &str) -> Option<String> {
    hit.metadata
        .extra
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use professoragent_retrieval::DocumentMetadata;
    use serde_json::json;

    fn hit(extra: Value) -> SearchHit {
        SearchHit {
            score: 3,
            snippet: "snippet".into(),
            metadata: DocumentMetadata {
                doc_id: json!("fac-9"),
                source_type: Some("faculty_profile".into()),
                extra: extra.as_object().cloned().unwrap_or_default(),
            },
        }
    }

    #[test]
    fn generated_untagged_shapes() {
        let parsed = Generated::Parsed(json!({"outline": ["Week 1"]}));
        assert_eq!(
            serde_json::to_value(&parsed).unwrap(),
            json!({"outline": ["Week 1"]})
        );

        let unparsed = Generated::unparsed("not json");
        assert_eq!(
            serde_json::to_value(&unparsed).unwrap(),
            json!({"error": "JSON parsing failed", "raw_response": "not json"})
        );
        assert!(!unparsed.is_parsed());
    }

    #[test]
    fn generated_error_shape_round_trips_as_unparsed() {
        let value = json!({"error": "JSON parsing failed", "raw_response": "x"});
        let g: Generated = serde_json::from_value(value).unwrap();
        assert_eq!(g, Generated::unparsed("x"));
    }

    #[test]
    fn collaborator_reads_metadata() {
        let m = CollaboratorMatch::from(&hit(json!({"name": "Dr. X", "department": 7})));
        assert_eq!(m.name.as_deref(), Some("Dr. X"));
        assert_eq!(m.department, None);
        assert_eq!(m.doc_id, json!("fac-9"));
        assert_eq!(m.score, 3);
    }

    #[test]
    fn artifact_is_tagged_by_kind() {
        let artifact = Artifact::Grants(GrantSuggestions::default());
        assert_eq!(
            serde_json::to_value(&artifact).unwrap(),
            json!({"kind": "grants", "data": {"top_grants": []}})
        );
        assert!(artifact.as_context().is_none());
    }
}
