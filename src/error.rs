//! Custom error types for elibscrape.
//!
//! Network failures (`Timeout`, `Connection`, `HttpStatus`) are recoverable
//! by the search loop; everything else ends the run.

use thiserror::Error;

/// Main error type for elibscrape operations.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Request did not complete within the configured timeout
    #[error("Timeout fetching {url}")]
    Timeout { url: String },

    /// Connection could not be established or the body could not be read
    #[error("Connection error fetching {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-2xx status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    /// HTML parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// CAPTCHA / anti-bot page served instead of results
    #[error("CAPTCHA detected, search engine is blocking requests")]
    Captcha,

    /// The same listing page failed too many times in a row
    #[error("Gave up on page {page} after {attempts} consecutive failed attempts")]
    FetchExhausted { page: u32, attempts: u32 },

    /// Output file write failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Run cancelled by the user; `written` records were saved first
    #[error("Interrupted after saving {written} records")]
    Interrupted { written: usize },
}

impl ScrapeError {
    /// Classify a reqwest failure for `url` into the network taxonomy.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }
        } else {
            Self::Connection {
                url: url.to_string(),
                source: err,
            }
        }
    }

    /// Whether the search loop may retry after this error.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Connection { .. } | Self::HttpStatus { .. }
        )
    }
}

/// Result type alias using `ScrapeError`
pub type Result<T> = std::result::Result<T, ScrapeError>;
