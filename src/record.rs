//! Output record types.
//!
//! Every column is a plain string that defaults to empty, so any record can
//! be written under any extractor's column set.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Year value used when no 4-digit year could be found.
pub const UNKNOWN_YEAR: &str = "unknown";

/// Whether a publication is included in the bibliometric index (RINC).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexedFlag {
    Yes,
    #[default]
    No,
    UnderReview,
}

impl fmt::Display for IndexedFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::UnderReview => "under review",
        };
        f.write_str(s)
    }
}

/// Fields taken from a detail page. All zero-valued by default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleDetails {
    pub journal: String,
    pub volume: String,
    pub issue: String,
    pub abstract_text: String,
    pub publication_type: String,
    pub indexed: IndexedFlag,
    pub keywords: Vec<String>,
    /// Year found on the detail page, used only when the listing had none
    pub year: Option<String>,
}

/// One scraped publication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArticleRecord {
    pub title: String,
    pub year: String,
    pub url: String,
    pub authors: String,
    pub journal: String,
    pub volume: String,
    pub issue: String,
    /// Raw journal/year segment from the listing row
    pub journal_info: String,
    pub abstract_text: String,
    pub publication_type: String,
    pub indexed: IndexedFlag,
    pub keywords: Vec<String>,
}

impl ArticleRecord {
    /// Start a record from a listing row. Other fields stay empty.
    pub fn new(title: impl Into<String>, url: impl Into<String>, year: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            year: year.into(),
            url: url.into(),
            authors: String::new(),
            journal: String::new(),
            volume: String::new(),
            issue: String::new(),
            journal_info: String::new(),
            abstract_text: String::new(),
            publication_type: String::new(),
            indexed: IndexedFlag::No,
            keywords: Vec::new(),
        }
    }

    /// Merge detail-page fields into the record.
    pub fn with_details(mut self, details: ArticleDetails) -> Self {
        self.journal = details.journal;
        self.volume = details.volume;
        self.issue = details.issue;
        self.abstract_text = details.abstract_text;
        self.publication_type = details.publication_type;
        self.indexed = details.indexed;
        self.keywords = details.keywords;
        if self.year == UNKNOWN_YEAR {
            if let Some(year) = details.year {
                self.year = year;
            }
        }
        self
    }

    /// Value of one output column. Unknown columns are empty.
    pub fn column(&self, name: &str) -> String {
        match name {
            "title" => self.title.clone(),
            "year" => self.year.clone(),
            "url" => self.url.clone(),
            "authors" => self.authors.clone(),
            "journal" => self.journal.clone(),
            "volume" => self.volume.clone(),
            "issue" => self.issue.clone(),
            "journal_info" => self.journal_info.clone(),
            "abstract" => self.abstract_text.clone(),
            "type" => self.publication_type.clone(),
            "in_rinc" => self.indexed.to_string(),
            "keywords" => self.keywords.join(", "),
            _ => String::new(),
        }
    }

    /// Row in the order of `columns`.
    pub fn to_row(&self, columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| self.column(c)).collect()
    }
}
