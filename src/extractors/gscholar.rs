//! Google Scholar result pages.
//!
//! Listing rows are `div.gs_r.gs_or.gs_scl`. Result links point at
//! publisher pages, so the "detail page" is whatever the publisher serves;
//! keywords and abstract come from its `<meta>` tags.

use super::{extract_year, find_year, selector, FieldExtractor, ListingPage, SearchRequest};
use crate::client::FetchedPage;
use crate::error::{Result, ScrapeError};
use crate::normalize::clean_text;
use crate::record::{ArticleDetails, ArticleRecord};
use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

/// Results Scholar returns per listing page
const RESULTS_PER_PAGE: u32 = 10;

/// Source data type filter: articles, excluding patents and citations
const DEFAULT_SDT: &str = "0,5";

/// Keywords kept per article
const MAX_KEYWORDS: usize = 10;

const COLUMNS: &[&str] = &["title", "year", "url", "keywords"];

const CAPTCHA_MARKERS: &[&str] = &["Solving the above CAPTCHA", "unusual traffic", "id=\"gs_captcha"];

const KEYWORD_META: &[&str] = &[
    "meta[name='citation_keywords']",
    "meta[name='keywords']",
    "meta[name='dc.subject']",
    "meta[name='DC.subject']",
];

const ABSTRACT_META: &[&str] = &[
    "meta[name='citation_abstract']",
    "meta[name='dc.description']",
    "meta[name='description']",
    "meta[property='og:description']",
];

const DATE_META: &[&str] = &[
    "meta[name='citation_publication_date']",
    "meta[name='citation_date']",
    "meta[name='dc.date']",
];

/// Google Scholar extractor with an optional title filter
pub struct ScholarExtractor {
    filter_keywords: Vec<String>,
}

impl ScholarExtractor {
    /// `filter_keywords`: keep only titles containing at least one of these
    /// (case-insensitive). Empty keeps everything.
    pub fn new(filter_keywords: Vec<String>) -> Self {
        Self {
            filter_keywords: filter_keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    fn passes_filter(&self, title: &str) -> bool {
        if self.filter_keywords.is_empty() {
            return true;
        }
        let title = title.to_lowercase();
        self.filter_keywords.iter().any(|k| title.contains(k.as_str()))
    }
}

impl FieldExtractor for ScholarExtractor {
    fn name(&self) -> &'static str {
        "gscholar"
    }

    fn columns(&self) -> &'static [&'static str] {
        COLUMNS
    }

    fn search_request(&self, base: &Url, topic: &str, page: u32) -> Result<SearchRequest> {
        let url = base
            .join("scholar")
            .map_err(|e| ScrapeError::Config(format!("Invalid base URL: {}", e)))?;
        let start = page.saturating_sub(1) * RESULTS_PER_PAGE;

        Ok(SearchRequest {
            url,
            params: vec![
                ("start", start.to_string()),
                ("q", topic.to_string()),
                ("hl", "en".to_string()),
                ("as_sdt", DEFAULT_SDT.to_string()),
            ],
        })
    }

    fn parse_listing(&self, html: &str, base: &Url) -> Result<ListingPage> {
        let document = Html::parse_document(html);

        let item_selector = selector("div.gs_r.gs_or.gs_scl")?;
        let title_selector = selector("h3.gs_rt")?;
        let link_selector = selector("h3.gs_rt a[href]")?;
        let meta_selector = selector("div.gs_a")?;

        let mut page = ListingPage::default();

        for item in document.select(&item_selector) {
            page.rows_found += 1;

            let Some(title_elem) = item.select(&title_selector).next() else {
                continue;
            };
            let link = item.select(&link_selector).next();
            let title = match link {
                Some(link) => clean_text(&link.text().collect::<String>()),
                None => clean_text(&title_elem.text().collect::<String>()),
            };

            // Citation-only entries have no link and nothing to follow
            let Some(url) = link
                .and_then(|l| l.value().attr("href"))
                .and_then(|href| base.join(href).ok())
            else {
                debug!(title = %title, "Result without link, skipping");
                continue;
            };

            if title.is_empty() {
                continue;
            }
            if !self.passes_filter(&title) {
                info!(title = %title, "Filtered out by title keywords");
                continue;
            }

            let meta_text = item
                .select(&meta_selector)
                .next()
                .map(|m| m.text().collect::<String>())
                .unwrap_or_default();

            let mut record = ArticleRecord::new(title, url.to_string(), extract_year(&meta_text));
            if let Some(author) = meta_text.split(" - ").next() {
                record.authors = clean_text(author);
            }
            page.records.push(record);
        }

        Ok(page)
    }

    fn parse_detail(&self, page: &FetchedPage) -> ArticleDetails {
        if page.is_pdf() {
            debug!(url = %page.url, "PDF content, no metadata extracted");
            return ArticleDetails::default();
        }
        parse_meta_tags(&page.body).unwrap_or_else(|e| {
            warn!(url = %page.url, error = %e, "Detail extraction failed, using empty fields");
            ArticleDetails::default()
        })
    }

    fn is_blocked(&self, html: &str) -> bool {
        CAPTCHA_MARKERS.iter().any(|m| html.contains(m))
    }
}

/// Keywords, abstract and date from publisher `<meta>` tags.
fn parse_meta_tags(html: &str) -> Result<ArticleDetails> {
    let document = Html::parse_document(html);
    let mut details = ArticleDetails::default();

    for css in KEYWORD_META {
        let meta = selector(css)?;
        for tag in document.select(&meta) {
            let content = tag.value().attr("content").unwrap_or_default();
            for keyword in content.split([',', ';']) {
                let keyword = clean_text(keyword);
                let duplicate = details
                    .keywords
                    .iter()
                    .any(|k| k.to_lowercase() == keyword.to_lowercase());
                if !keyword.is_empty() && !duplicate && details.keywords.len() < MAX_KEYWORDS {
                    details.keywords.push(keyword);
                }
            }
        }
    }

    details.abstract_text = first_meta_content(&document, ABSTRACT_META)?.unwrap_or_default();
    details.year = first_meta_content(&document, DATE_META)?.and_then(|d| find_year(&d));

    Ok(details)
}

fn first_meta_content(document: &Html, selectors: &[&str]) -> Result<Option<String>> {
    for css in selectors {
        let meta = selector(css)?;
        let content = document
            .select(&meta)
            .filter_map(|tag| tag.value().attr("content"))
            .map(clean_text)
            .find(|c| !c.is_empty());
        if content.is_some() {
            return Ok(content);
        }
    }
    Ok(None)
}
