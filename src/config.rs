//! Run configuration.
//!
//! Defaults mirror a typical eLibrary run; a JSON file can override any
//! subset of fields and the CLI overrides the file.

use crate::error::{Result, ScrapeError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default eLibrary URL
pub const DEFAULT_ELIBRARY_URL: &str = "http://elibrary.ru";

/// Default Google Scholar URL
pub const DEFAULT_SCHOLAR_URL: &str = "https://scholar.google.com";

/// Search engine and output layout to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    /// eLibrary with authors / journal / volume / issue columns
    #[default]
    Elibrary,
    /// eLibrary with publication type and RINC membership columns
    ElibraryIndex,
    /// Google Scholar with keyword column
    Gscholar,
}

impl Source {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Elibrary | Self::ElibraryIndex => DEFAULT_ELIBRARY_URL,
            Self::Gscholar => DEFAULT_SCHOLAR_URL,
        }
    }

    pub fn default_output(self) -> &'static str {
        match self {
            Self::Elibrary => "elibrary_articles.csv",
            Self::ElibraryIndex => "elibrary_rinc_articles.csv",
            Self::Gscholar => "scholar_articles.csv",
        }
    }
}

impl std::str::FromStr for Source {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "elibrary" => Ok(Self::Elibrary),
            "elibrary-index" => Ok(Self::ElibraryIndex),
            "gscholar" => Ok(Self::Gscholar),
            other => Err(ScrapeError::Config(format!("Unknown source: {}", other))),
        }
    }
}

/// Scraper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub source: Source,
    /// Search topic
    pub topic: String,
    /// Number of records to emit
    pub num_articles: usize,
    /// Output CSV path (per-source default when unset)
    pub output_path: Option<PathBuf>,
    /// Minimum delay between requests, seconds
    pub delay_min: f64,
    /// Maximum delay between requests, seconds
    pub delay_max: f64,
    /// Request timeout, seconds
    pub timeout: u64,
    /// Search engine base URL (per-source default when unset)
    pub base_url: Option<String>,
    /// Consecutive listing fetch failures tolerated before giving up
    pub max_retries: u32,
    /// Stop after this many listing pages
    pub max_pages: Option<u32>,
    /// Keep only titles containing one of these (gscholar)
    pub filter_keywords: Vec<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            source: Source::default(),
            topic: "multiplayer game engine architecture".to_string(),
            num_articles: 20,
            output_path: None,
            delay_min: 5.0,
            delay_max: 12.0,
            timeout: 30,
            base_url: None,
            max_retries: 5,
            max_pages: None,
            filter_keywords: Vec::new(),
        }
    }
}

impl ScraperConfig {
    /// Load configuration from a JSON file. Missing fields keep defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Reject values the run cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(ScrapeError::Config("topic must not be empty".to_string()));
        }
        if self.num_articles == 0 {
            return Err(ScrapeError::Config(
                "num_articles must be at least 1".to_string(),
            ));
        }
        if !self.delay_min.is_finite() || !self.delay_max.is_finite() || self.delay_min < 0.0 {
            return Err(ScrapeError::Config(
                "delays must be finite and non-negative".to_string(),
            ));
        }
        if self.delay_min > self.delay_max {
            return Err(ScrapeError::Config(format!(
                "delay_min ({}) exceeds delay_max ({})",
                self.delay_min, self.delay_max
            )));
        }
        if self.timeout == 0 {
            return Err(ScrapeError::Config("timeout must be positive".to_string()));
        }
        if self.max_retries == 0 {
            return Err(ScrapeError::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }
        self.base_url()?;
        Ok(())
    }

    /// Parsed base URL, always ending in `/` so relative joins keep the path.
    pub fn base_url(&self) -> Result<Url> {
        let raw = self
            .base_url
            .as_deref()
            .unwrap_or_else(|| self.source.default_base_url());
        let normalized = format!("{}/", raw.trim_end_matches('/'));
        Url::parse(&normalized)
            .map_err(|e| ScrapeError::Config(format!("Invalid base URL '{}': {}", raw, e)))
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.source.default_output()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
