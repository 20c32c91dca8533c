//! Crossref works search (`GET /works?query=...`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use professoragent_shared::{Paper, Result, SourceTag, endpoint};

use super::{
    LiteratureSource, clean_text, fetch_text, lenient, page_size, parse_json, strip_markup,
};

/// Queries the Crossref `works` endpoint.
pub struct CrossrefSource {
    client: Client,
    base_url: Url,
    mailto: String,
}

impl CrossrefSource {
    /// `mailto` is sent with every request so Crossref routes us to its
    /// polite pool.
    pub fn new(client: Client, base_url: Url, mailto: impl Into<String>) -> Self {
        Self {
            client,
            base_url,
            mailto: mailto.into(),
        }
    }
}

#[async_trait]
impl LiteratureSource for CrossrefSource {
    fn tag(&self) -> SourceTag {
        SourceTag::Crossref
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        timeout: Duration,
    ) -> Result<Vec<Paper>> {
        let url = endpoint(&self.base_url, "works")?;
        let params = [
            ("query", query.to_string()),
            ("rows", page_size(max_results).to_string()),
            ("mailto", self.mailto.clone()),
        ];
        let body = fetch_text(&self.client, url, &params, timeout).await?;
        let papers = parse_works(&body)?;
        debug!(count = papers.len(), "crossref results parsed");
        Ok(papers)
    }
}

// ---------------------------------------------------------------------------
// Response shape
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct WorksResponse {
    #[serde(default, deserialize_with = "lenient")]
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default, deserialize_with = "lenient")]
    items: Option<Vec<Item>>,
}

#[derive(Deserialize)]
struct Item {
    #[serde(default, deserialize_with = "lenient")]
    title: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    author: Option<Vec<Author>>,
    #[serde(default, deserialize_with = "lenient")]
    issued: Option<Issued>,
    #[serde(rename = "container-title", default, deserialize_with = "lenient")]
    container_title: Option<Vec<String>>,
    #[serde(rename = "DOI", default, deserialize_with = "lenient")]
    doi: Option<String>,
    #[serde(rename = "URL", default, deserialize_with = "lenient")]
    url: Option<String>,
    #[serde(rename = "abstract", default, deserialize_with = "lenient")]
    abstract_text: Option<String>,
}

#[derive(Deserialize)]
struct Author {
    #[serde(default, deserialize_with = "lenient")]
    given: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    family: Option<String>,
}

#[derive(Deserialize)]
struct Issued {
    #[serde(rename = "date-parts", default)]
    date_parts: Option<serde_json::Value>,
}

impl Issued {
    /// `date-parts` looks like `[[2020, 5, 1]]`; the year is the first
    /// element of the first part when it is an integer.
    fn year(&self) -> Option<i64> {
        self.date_parts.as_ref()?.get(0)?.get(0)?.as_i64()
    }
}

fn parse_works(body: &str) -> Result<Vec<Paper>> {
    let response: WorksResponse = parse_json(SourceTag::Crossref, body)?;

    let items = response
        .message
        .and_then(|m| m.items)
        .unwrap_or_default();

    Ok(items
        .into_iter()
        .map(|item| {
            let title = item
                .title
                .as_deref()
                .and_then(|t| t.first())
                .and_then(|t| clean_text(Some(t)))
                .unwrap_or_else(|| "Untitled".into());

            let authors = item
                .author
                .unwrap_or_default()
                .into_iter()
                .filter_map(|a| {
                    let full = format!(
                        "{} {}",
                        a.given.unwrap_or_default(),
                        a.family.unwrap_or_default()
                    );
                    clean_text(Some(&full))
                })
                .collect();

            let venue = item
                .container_title
                .as_deref()
                .and_then(|t| t.first())
                .and_then(|t| clean_text(Some(t)));

            Paper {
                source: SourceTag::Crossref,
                title,
                authors,
                year: item.issued.as_ref().and_then(Issued::year),
                venue,
                abstract_text: item.abstract_text.as_deref().and_then(strip_markup),
                url: clean_text(item.url.as_deref()),
                doi: clean_text(item.doi.as_deref()),
            }
        })
        .collect())
}
