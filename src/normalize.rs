//! Text cleanup for strings pulled out of scraped HTML.

use regex::Regex;
use scraper::ElementRef;
use std::sync::OnceLock;

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(?:PDF|HTML|CITATION|BOOK|B|C)\]").expect("tag pattern is valid")
    })
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove bracketed format tags such as `[PDF]` or `[HTML]`.
pub fn strip_tags(text: &str) -> String {
    tag_regex().replace_all(text, "").into_owned()
}

/// Full cleanup applied to every emitted text field.
pub fn clean_text(text: &str) -> String {
    collapse_whitespace(&strip_tags(text))
}

/// Text nodes of `element`, each trimmed, empties dropped, joined by `sep`.
pub fn joined_text(element: &ElementRef<'_>, sep: &str) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}
