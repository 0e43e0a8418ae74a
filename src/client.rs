//! HTTP session for search and detail pages.
//!
//! Wraps a `reqwest::Client` whose cookie jar lives for one run, and rotates
//! browser-like header profiles per request.

use crate::error::{Result, ScrapeError};
use rand::seq::SliceRandom;
use reqwest::cookie::Jar;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A user-agent / referer pair sent together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderProfile {
    pub user_agent: &'static str,
    pub referer: &'static str,
}

/// Built-in header pool
pub const DEFAULT_PROFILES: &[HeaderProfile] = &[
    HeaderProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/74.0.3729.169 Safari/537.36",
        referer: "https://www.google.com/",
    },
    HeaderProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        referer: "https://www.google.com/",
    },
    HeaderProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        referer: "https://yandex.ru/",
    },
    HeaderProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
        referer: "https://www.bing.com/",
    },
];

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    /// Final URL after redirects
    pub url: String,
    /// Lower-cased `Content-Type` header, empty if absent
    pub content_type: String,
    pub body: String,
}

impl FetchedPage {
    pub fn is_pdf(&self) -> bool {
        self.content_type.contains("application/pdf") || self.url.to_lowercase().ends_with(".pdf")
    }
}

/// HTTP client with a per-run cookie session
pub struct FetchClient {
    client: reqwest::Client,
    profiles: Vec<HeaderProfile>,
    timeout: Duration,
}

impl FetchClient {
    /// Create a client using the built-in header pool.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_profiles(timeout, DEFAULT_PROFILES.to_vec())
    }

    /// Create a client with a custom header pool.
    pub fn with_profiles(timeout: Duration, profiles: Vec<HeaderProfile>) -> Result<Self> {
        if profiles.is_empty() {
            return Err(ScrapeError::Config("header profile pool is empty".to_string()));
        }
        Ok(Self {
            client: build_http_client(timeout)?,
            profiles,
            timeout,
        })
    }

    /// Drop all cookies by starting a fresh session.
    pub fn reset_session(&mut self) -> Result<()> {
        self.client = build_http_client(self.timeout)?;
        debug!("HTTP session reset");
        Ok(())
    }

    fn pick_profile(&self) -> &HeaderProfile {
        self.profiles
            .choose(&mut rand::thread_rng())
            .unwrap_or(&DEFAULT_PROFILES[0])
    }

    /// GET `url` with extra query `params`.
    ///
    /// Timeouts, connection failures and non-2xx statuses come back as the
    /// network variants of [`ScrapeError`].
    pub async fn fetch(&self, url: &Url, params: &[(&str, String)]) -> Result<FetchedPage> {
        let profile = self.pick_profile().clone();
        debug!(url = %url, params = ?params, user_agent = profile.user_agent, "GET");

        let response = self
            .client
            .get(url.as_str())
            .query(params)
            .header(reqwest::header::USER_AGENT, profile.user_agent)
            .header(reqwest::header::REFERER, profile.referer)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7")
            .send()
            .await
            .map_err(|e| ScrapeError::from_reqwest(url.as_str(), e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(ScrapeError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        let body = response
            .text()
            .await
            .map_err(|e| ScrapeError::from_reqwest(&final_url, e))?;

        Ok(FetchedPage {
            status: status.as_u16(),
            url: final_url,
            content_type,
            body,
        })
    }
}

/// Build HTTP client with a fresh cookie jar
fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .cookie_provider(Arc::new(Jar::default()))
        .timeout(timeout)
        .build()
        .map_err(|e| ScrapeError::Config(format!("Failed to build HTTP client: {}", e)))
}
