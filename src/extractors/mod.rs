//! Site-specific field extraction.
//!
//! Each search engine gets one [`FieldExtractor`] implementation holding all
//! of its selectors and text rules, so the search loop and the sink never
//! see site markup.

pub mod elibrary;
pub mod gscholar;

pub use elibrary::{ElibraryExtractor, ElibraryIndexExtractor};
pub use gscholar::ScholarExtractor;

use crate::client::FetchedPage;
use crate::config::{ScraperConfig, Source};
use crate::error::{Result, ScrapeError};
use crate::record::{ArticleDetails, ArticleRecord, UNKNOWN_YEAR};
use regex::Regex;
use scraper::Selector;
use std::sync::OnceLock;
use url::Url;

/// A listing-page request: target URL plus query parameters
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub url: Url,
    pub params: Vec<(&'static str, String)>,
}

/// Outcome of parsing one listing page
#[derive(Debug, Default)]
pub struct ListingPage {
    /// Row elements present on the page, usable or not
    pub rows_found: usize,
    /// Rows that yielded at least a title and URL
    pub records: Vec<ArticleRecord>,
}

impl ListingPage {
    /// No row elements at all: the result set is exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.rows_found == 0
    }
}

/// Extraction rules for one search engine
pub trait FieldExtractor: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Output columns, in order
    fn columns(&self) -> &'static [&'static str];

    /// Build the listing request for `page` (1-based).
    fn search_request(&self, base: &Url, topic: &str, page: u32) -> Result<SearchRequest>;

    /// Parse listing rows. Unusable rows are counted but skipped.
    fn parse_listing(&self, html: &str, base: &Url) -> Result<ListingPage>;

    /// Parse a detail page. Never fails: missing fields stay empty.
    fn parse_detail(&self, page: &FetchedPage) -> ArticleDetails;

    /// Whether the engine served an anti-bot page instead of results.
    fn is_blocked(&self, _html: &str) -> bool {
        false
    }
}

/// Pick the extractor for the configured source.
pub fn for_config(config: &ScraperConfig) -> Box<dyn FieldExtractor> {
    match config.source {
        Source::Elibrary => Box::new(ElibraryExtractor),
        Source::ElibraryIndex => Box::new(ElibraryIndexExtractor),
        Source::Gscholar => Box::new(ScholarExtractor::new(config.filter_keywords.clone())),
    }
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("year pattern is valid"))
}

/// First 4-digit year in 1900-2099 found in `text`, or [`UNKNOWN_YEAR`].
pub fn extract_year(text: &str) -> String {
    find_year(text).unwrap_or_else(|| UNKNOWN_YEAR.to_string())
}

pub(crate) fn find_year(text: &str) -> Option<String> {
    year_regex().find(text).map(|m| m.as_str().to_string())
}

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScrapeError::Parse(format!("{}: {}", css, e)))
}
