//! External literature search for ProfessorAgent.
//!
//! Three sources are queried in fixed priority order (OpenAlex, Crossref,
//! arXiv). A failing source is reported in the response instead of failing
//! the search, and overlapping results are deduplicated by DOI or title.

pub mod aggregator;
pub mod sources;

pub use aggregator::{
    LiteratureAggregator, LiteratureResponse, NO_RESULTS_WARNING, SearchOptions, SourceOutcome,
    SourceReport, USER_AGENT,
};
pub use sources::{ArxivSource, CrossrefSource, LiteratureSource, MAX_PAGE_SIZE, OpenAlexSource};
