//! eLibrary.ru search results and article pages.
//!
//! Listing rows are `<tr id="aNNN">` elements holding an `item.asp?id=` link.
//! Two column layouts are supported: the bibliographic one
//! ([`ElibraryExtractor`]) and the publication-type / RINC one
//! ([`ElibraryIndexExtractor`]). Both read the same article page.

use super::{extract_year, find_year, selector, FieldExtractor, ListingPage, SearchRequest};
use crate::client::FetchedPage;
use crate::error::{Result, ScrapeError};
use crate::normalize::{clean_text, collapse_whitespace, joined_text};
use crate::record::{ArticleDetails, ArticleRecord, IndexedFlag, UNKNOWN_YEAR};
use regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::OnceLock;
use tracing::{debug, warn};
use url::Url;

/// Result-type filters sent with every search
pub const SEARCH_QUERY_TEMPLATE: &str = "where_fulltext=on&where_name=on&where_abstract=on&where_keywords=on&where_affiliation=&where_references=&type_article=on&type_disser=on&type_book=on&type_report=on&type_conf=on&type_patent=on&type_preprint=on&type_grant=on&type_dataset=on&search_freetext=&search_morph=on&search_fulltext=&search_open=&search_results=&titles_all=&authors_all=&rubrics_all=&queryboxid=&itemboxid=&begin_year=&end_year=&issues=all&orderby=rank&order=rev&changed=1";

/// Labels that start a publication-type value
const TYPE_LABELS: &[&str] = &["Тип:", "Type:"];

/// Labels that may follow the type value in the same cell
const KNOWN_LABELS: &[&str] = &[
    "Тип:",
    "Язык:",
    "Год:",
    "Год издания:",
    "Том:",
    "Номер:",
    "Страницы:",
    "Дата депонирования:",
    "Дата размещения:",
    "Type:",
    "Language:",
    "Year:",
    "Volume:",
    "Number:",
    "Pages:",
];

/// Labels introducing the RINC membership value
const INDEX_LABELS: &[&str] = &["Входит в РИНЦ", "Included in RSCI"];
/// Labels that may follow the RINC value in the same cell
const AFTER_INDEX_LABELS: &[&str] = &["Входит в", "Included in", "Цитирований", "Citations"];
const UNDER_REVIEW: &[&str] = &["на рассмотрении", "under review"];
const YES: &[&str] = &["да", "yes"];

const BIBLIO_COLUMNS: &[&str] = &[
    "title",
    "authors",
    "year",
    "journal",
    "volume",
    "issue",
    "journal_info",
    "abstract",
    "url",
];

const INDEX_COLUMNS: &[&str] = &["title", "year", "type", "abstract", "in_rinc", "url"];

/// Fragments of the IP-block and robot-check pages, matched lowercase
const BLOCK_MARKERS: &[&str] = &[
    "ip-адрес был заблокирован",
    "ip address has been blocked",
    "подтвердите, что вы не робот",
    "g-recaptcha",
];

/// Bibliographic layout: authors, journal, volume, issue
pub struct ElibraryExtractor;

/// Classification layout: publication type and RINC membership
pub struct ElibraryIndexExtractor;

impl FieldExtractor for ElibraryExtractor {
    fn name(&self) -> &'static str {
        "elibrary"
    }

    fn columns(&self) -> &'static [&'static str] {
        BIBLIO_COLUMNS
    }

    fn search_request(&self, base: &Url, topic: &str, page: u32) -> Result<SearchRequest> {
        build_search_request(base, topic, page)
    }

    fn parse_listing(&self, html: &str, base: &Url) -> Result<ListingPage> {
        let info_selector = selector("td[align='left']")?;
        parse_rows(html, base, |row, mut record| {
            if let Some(cell) = row.select(&info_selector).next() {
                let text = joined_text(&cell, "|");
                let parts: Vec<&str> = text
                    .split('|')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .collect();
                if let Some(candidate) = parts.get(1) {
                    // Author lists carry initials: "Ivanov I.I., Petrov P.P."
                    if candidate.matches('.').count() >= 2 {
                        record.authors = clean_text(candidate);
                    }
                }
                let journal_info = parts.get(2..).map(|p| p.join(" ")).unwrap_or_default();
                record.year = extract_year(&journal_info);
                record.journal_info = clean_text(&journal_info);
            }
            record
        })
    }

    fn parse_detail(&self, page: &FetchedPage) -> ArticleDetails {
        detail_or_default(page)
    }

    fn is_blocked(&self, html: &str) -> bool {
        is_block_page(html)
    }
}

impl FieldExtractor for ElibraryIndexExtractor {
    fn name(&self) -> &'static str {
        "elibrary-index"
    }

    fn columns(&self) -> &'static [&'static str] {
        INDEX_COLUMNS
    }

    fn search_request(&self, base: &Url, topic: &str, page: u32) -> Result<SearchRequest> {
        build_search_request(base, topic, page)
    }

    fn parse_listing(&self, html: &str, base: &Url) -> Result<ListingPage> {
        parse_rows(html, base, |row, mut record| {
            record.year = extract_year(&joined_text(&row, " "));
            record
        })
    }

    fn parse_detail(&self, page: &FetchedPage) -> ArticleDetails {
        detail_or_default(page)
    }

    fn is_blocked(&self, html: &str) -> bool {
        is_block_page(html)
    }
}

fn is_block_page(html: &str) -> bool {
    let html = html.to_lowercase();
    BLOCK_MARKERS.iter().any(|m| html.contains(m))
}

fn build_search_request(base: &Url, topic: &str, page: u32) -> Result<SearchRequest> {
    let mut url = base
        .join("query_results.asp")
        .map_err(|e| ScrapeError::Config(format!("Invalid base URL: {}", e)))?;
    url.set_query(Some(SEARCH_QUERY_TEMPLATE));

    Ok(SearchRequest {
        url,
        params: vec![("ftext", topic.to_string()), ("pagenum", page.to_string())],
    })
}

fn row_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^a\d+$").expect("row id pattern is valid"))
}

fn item_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"item\.asp\?id=\d+").expect("item link pattern is valid"))
}

/// Walk listing rows, building a base record per row and handing it to
/// `fill` for layout-specific fields.
fn parse_rows<F>(html: &str, base: &Url, fill: F) -> Result<ListingPage>
where
    F: Fn(ElementRef<'_>, ArticleRecord) -> ArticleRecord,
{
    let document = Html::parse_document(html);
    let row_selector = selector("tr[id]")?;
    let link_selector = selector("a[href]")?;

    let mut page = ListingPage::default();

    for row in document.select(&row_selector) {
        let is_result_row = row
            .value()
            .attr("id")
            .is_some_and(|id| row_id_regex().is_match(id));
        if !is_result_row {
            continue;
        }
        page.rows_found += 1;

        let Some(link) = row.select(&link_selector).find(|a| {
            a.value()
                .attr("href")
                .is_some_and(|href| item_link_regex().is_match(href))
        }) else {
            debug!(row = row.value().attr("id"), "Row without article link, skipping");
            continue;
        };

        let title = clean_text(&link.text().collect::<String>());
        let href = link.value().attr("href").unwrap_or_default();
        let url = match base.join(href) {
            Ok(url) => url,
            Err(e) => {
                debug!(href, error = %e, "Unresolvable article link, skipping");
                continue;
            }
        };
        if title.is_empty() {
            debug!(url = %url, "Row without title, skipping");
            continue;
        }

        let record = ArticleRecord::new(title, url.to_string(), UNKNOWN_YEAR);
        page.records.push(fill(row, record));
    }

    Ok(page)
}

fn detail_or_default(page: &FetchedPage) -> ArticleDetails {
    parse_detail_page(&page.body).unwrap_or_else(|e| {
        warn!(url = %page.url, error = %e, "Detail extraction failed, using empty fields");
        ArticleDetails::default()
    })
}

fn volume_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Том:\s*(\S+)").expect("volume pattern is valid"))
}

fn issue_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Номер:\s*(\S+)").expect("issue pattern is valid"))
}

fn detail_year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Год(?: издания)?:\s*(\d{4})").expect("year label pattern is valid"))
}

/// Extract every detail field the article page offers.
pub fn parse_detail_page(html: &str) -> Result<ArticleDetails> {
    let document = Html::parse_document(html);
    let mut details = ArticleDetails::default();

    let journal_selector = selector("a[href*='contents.asp?id=']")?;
    if let Some(journal) = document.select(&journal_selector).next() {
        details.journal = clean_text(&journal.text().collect::<String>());
    }

    let info_selector = selector("table[width='580']")?;
    if let Some(table) = document.select(&info_selector).next() {
        let text = joined_text(&table, " ");
        details.volume = capture(volume_regex(), &text);
        details.issue = capture(issue_regex(), &text);
        details.year = detail_year_regex()
            .captures(&text)
            .and_then(|c| c.get(1))
            .and_then(|m| find_year(m.as_str()));
    }

    for id in ["abstract1", "abstract2"] {
        let abstract_selector = selector(&format!("div#{}", id))?;
        if let Some(div) = document.select(&abstract_selector).next() {
            details.abstract_text = clean_text(&joined_text(&div, " "));
            break;
        }
    }

    let cells = cell_texts(&document)?;
    details.publication_type = publication_type(&cells).unwrap_or_default();
    details.indexed = indexed_flag(&cells);

    Ok(details)
}

fn capture(re: &Regex, text: &str) -> String {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches([',', ';']).to_string())
        .unwrap_or_default()
}

/// Normalized text of every table cell, innermost cells first.
fn cell_texts(document: &Html) -> Result<Vec<String>> {
    let td_selector = selector("td")?;
    let mut cells: Vec<String> = document
        .select(&td_selector)
        .map(|td| collapse_whitespace(&joined_text(&td, " ")))
        .filter(|t| !t.is_empty())
        .collect();
    // Layout tables nest; the shortest cell holding a label is the one that owns it
    cells.sort_by_key(|t| t.chars().count());
    Ok(cells)
}

/// Text after the first type label, cut at the next known label.
fn publication_type(cells: &[String]) -> Option<String> {
    cells.iter().find_map(|cell| {
        let (label_at, label) = TYPE_LABELS
            .iter()
            .filter_map(|l| cell.find(l).map(|i| (i, *l)))
            .min_by_key(|(i, _)| *i)?;
        let rest = &cell[label_at + label.len()..];
        let end = KNOWN_LABELS
            .iter()
            .filter_map(|l| rest.find(l))
            .min()
            .unwrap_or(rest.len());
        let value = rest[..end].trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// RINC membership: under review, yes, or no when absent or anything else.
fn indexed_flag(cells: &[String]) -> IndexedFlag {
    let value = cells.iter().find_map(|cell| {
        INDEX_LABELS.iter().find_map(|label| {
            cell.find(label).map(|i| {
                let rest = cell[i + label.len()..]
                    .trim_start_matches(|c: char| c == '®' || c == ':' || c.is_whitespace());
                let end = AFTER_INDEX_LABELS
                    .iter()
                    .filter_map(|l| rest.find(l))
                    .min()
                    .unwrap_or(rest.len());
                rest[..end].to_lowercase()
            })
        })
    });

    match value {
        Some(v) if UNDER_REVIEW.iter().any(|p| v.contains(p)) => IndexedFlag::UnderReview,
        Some(v) if YES.iter().any(|p| v.starts_with(p)) => IndexedFlag::Yes,
        _ => IndexedFlag::No,
    }
}
