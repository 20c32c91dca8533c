//! arXiv Atom API search (`GET /api/query?search_query=all:...`).

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::Client;
use tracing::debug;
use url::Url;

use professoragent_shared::{Paper, ProfessorAgentError, Result, SourceTag, endpoint};

use super::{LiteratureSource, clean_text, fetch_text, page_size, strip_markup};

/// Venue reported for every arXiv preprint.
const ARXIV_VENUE: &str = "arXiv";

/// Queries the arXiv export API and parses its Atom feed.
pub struct ArxivSource {
    client: Client,
    base_url: Url,
}

impl ArxivSource {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl LiteratureSource for ArxivSource {
    fn tag(&self) -> SourceTag {
        SourceTag::Arxiv
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        timeout: Duration,
    ) -> Result<Vec<Paper>> {
        let url = endpoint(&self.base_url, "api/query")?;
        let params = [
            ("search_query", format!("all:{query}")),
            ("start", "0".to_string()),
            ("max_results", page_size(max_results).to_string()),
        ];
        let body = fetch_text(&self.client, url, &params, timeout).await?;
        let papers = parse_feed(&body)?;
        debug!(count = papers.len(), "arxiv entries parsed");
        Ok(papers)
    }
}

// ---------------------------------------------------------------------------
// Atom parsing
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Summary,
    Id,
    Published,
    AuthorName,
}

#[derive(Default)]
struct EntryBuilder {
    title: String,
    summary: String,
    id: String,
    published: String,
    authors: Vec<String>,
}

impl EntryBuilder {
    fn finish(self) -> Paper {
        let year = self
            .published
            .trim()
            .get(..4)
            .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
            .and_then(|y| y.parse().ok());

        Paper {
            source: SourceTag::Arxiv,
            title: clean_text(Some(&self.title)).unwrap_or_else(|| "Untitled".into()),
            authors: self.authors,
            year,
            venue: Some(ARXIV_VENUE.to_string()),
            abstract_text: strip_markup(&self.summary),
            url: clean_text(Some(&self.id)),
            doi: None,
        }
    }
}

/// Parse an arXiv Atom feed into papers, one per `<entry>`.
///
/// Feed-level `<title>`/`<id>` elements are ignored; only elements nested in
/// an entry are read.
fn parse_feed(xml: &str) -> Result<Vec<Paper>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut entry: Option<EntryBuilder> = None;
    let mut in_author = false;
    let mut field: Option<Field> = None;
    let mut author_name = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ProfessorAgentError::parse(format!("arxiv: malformed feed: {e}")))?;

        match event {
            Event::Start(e) => match (e.local_name().as_ref(), entry.is_some(), in_author) {
                (b"entry", _, _) => entry = Some(EntryBuilder::default()),
                (b"author", true, _) => {
                    in_author = true;
                    author_name.clear();
                }
                (b"name", true, true) => field = Some(Field::AuthorName),
                (b"title", true, false) => field = Some(Field::Title),
                (b"summary", true, false) => field = Some(Field::Summary),
                (b"id", true, false) => field = Some(Field::Id),
                (b"published", true, false) => field = Some(Field::Published),
                _ => {}
            },
            Event::Text(t) => {
                if let Some(f) = field {
                    let text = t.unescape().map_err(|e| {
                        ProfessorAgentError::parse(format!("arxiv: bad text content: {e}"))
                    })?;
                    push_text(entry.as_mut(), &mut author_name, f, &text);
                }
            }
            Event::CData(c) => {
                if let Some(f) = field {
                    let text = String::from_utf8_lossy(&c);
                    push_text(entry.as_mut(), &mut author_name, f, &text);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"entry" => {
                    if let Some(done) = entry.take() {
                        papers.push(done.finish());
                    }
                    in_author = false;
                    field = None;
                }
                b"author" if in_author => {
                    in_author = false;
                    if let (Some(builder), Some(name)) =
                        (entry.as_mut(), clean_text(Some(&author_name)))
                    {
                        builder.authors.push(name);
                    }
                }
                b"title" | b"summary" | b"id" | b"published" | b"name" => field = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(papers)
}

fn push_text(entry: Option<&mut EntryBuilder>, author_name: &mut String, field: Field, text: &str) {
    if field == Field::AuthorName {
        author_name.push_str(text);
        return;
    }
    let Some(entry) = entry else { return };
    let target = match field {
        Field::Title => &mut entry.title,
        Field::Summary => &mut entry.summary,
        Field::Id => &mut entry.id,
        Field::Published => &mut entry.published,
        Field::AuthorName => return,
    };
    target.push_str(text);
}
