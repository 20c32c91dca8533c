//! OpenAlex works search (`GET /works?search=...`).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use professoragent_shared::{Paper, Result, SourceTag, endpoint};

use super::{LiteratureSource, clean_text, fetch_text, lenient, page_size, parse_json};

/// Queries the OpenAlex `works` endpoint.
pub struct OpenAlexSource {
    client: Client,
    base_url: Url,
}

impl OpenAlexSource {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl LiteratureSource for OpenAlexSource {
    fn tag(&self) -> SourceTag {
        SourceTag::OpenAlex
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        timeout: Duration,
    ) -> Result<Vec<Paper>> {
        let url = endpoint(&self.base_url, "works")?;
        let params = [
            ("search", query.to_string()),
            ("per-page", page_size(max_results).to_string()),
        ];
        let body = fetch_text(&self.client, url, &params, timeout).await?;
        let papers = parse_works(&body)?;
        debug!(count = papers.len(), "openalex results parsed");
        Ok(papers)
    }
}

// ---------------------------------------------------------------------------
// Response shape
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct WorksResponse {
    #[serde(default, deserialize_with = "lenient")]
    results: Option<Vec<Work>>,
}

#[derive(Deserialize)]
struct Work {
    #[serde(default, deserialize_with = "lenient")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    publication_year: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    authorships: Option<Vec<Authorship>>,
    #[serde(default, deserialize_with = "lenient")]
    abstract_inverted_index: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "lenient")]
    primary_location: Option<Location>,
    #[serde(default, deserialize_with = "lenient")]
    doi: Option<String>,
}

#[derive(Deserialize)]
struct Authorship {
    #[serde(default, deserialize_with = "lenient")]
    author: Option<DisplayNamed>,
}

#[derive(Deserialize)]
struct Location {
    #[serde(default, deserialize_with = "lenient")]
    source: Option<DisplayNamed>,
}

#[derive(Deserialize)]
struct DisplayNamed {
    #[serde(default, deserialize_with = "lenient")]
    display_name: Option<String>,
}

fn parse_works(body: &str) -> Result<Vec<Paper>> {
    let response: WorksResponse = parse_json(SourceTag::OpenAlex, body)?;

    Ok(response
        .results
        .unwrap_or_default()
        .into_iter()
        .map(|work| {
            let authors = work
                .authorships
                .unwrap_or_default()
                .into_iter()
                .filter_map(|a| a.author.and_then(|author| author.display_name))
                .filter(|name| !name.is_empty())
                .collect();

            let abstract_text = work
                .abstract_inverted_index
                .as_ref()
                .and_then(rebuild_inverted_abstract);

            let venue = work
                .primary_location
                .and_then(|loc| loc.source)
                .and_then(|source| clean_text(source.display_name.as_deref()));

            Paper {
                source: SourceTag::OpenAlex,
                title: clean_text(work.title.as_deref()).unwrap_or_else(|| "Untitled".into()),
                authors,
                year: work.publication_year,
                venue,
                abstract_text: clean_text(abstract_text.as_deref()),
                url: work.id,
                doi: clean_text(work.doi.as_deref()),
            }
        })
        .collect())
}

/// Rebuild linear text from OpenAlex's `word -> [positions]` abstract index.
///
/// Each word is placed at every recorded position and the words are joined in
/// position order. When two words claim a position, the one later in the
/// index wins. Non-integer positions are skipped. Returns `None` for an
/// empty index.
pub(crate) fn rebuild_inverted_abstract(index: &Map<String, Value>) -> Option<String> {
    let mut by_position: BTreeMap<u64, &str> = BTreeMap::new();
    for (word, positions) in index {
        let Some(positions) = positions.as_array() else {
            continue;
        };
        for pos in positions.iter().filter_map(Value::as_u64) {
            by_position.insert(pos, word.as_str());
        }
    }

    if by_position.is_empty() {
        return None;
    }
    Some(by_position.into_values().collect::<Vec<_>>().join(" "))
}
