//! Paginated search loop.
//!
//! Pages are fetched one at a time; every usable listing row is completed
//! from its detail page and appended to the sink before the next row is
//! touched. The run ends when the target count is reached or a listing
//! page has no result rows at all.

use crate::client::FetchClient;
use crate::config::ScraperConfig;
use crate::error::{Result, ScrapeError};
use crate::extractors::{FieldExtractor, ListingPage};
use crate::rate_limit::RateLimiter;
use crate::record::ArticleDetails;
use crate::sink::CsvSink;
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::future::Future;
use tracing::{debug, error, info, warn};
use url::Url;

/// Progress of one run
#[derive(Debug)]
pub struct SearchSession {
    topic: String,
    target: usize,
    page: u32,
    emitted: usize,
    pages_fetched: u32,
    seen_urls: HashSet<String>,
}

impl SearchSession {
    pub fn new(topic: impl Into<String>, target: usize) -> Self {
        Self {
            topic: topic.into(),
            target,
            page: 1,
            emitted: 0,
            pages_fetched: 0,
            seen_urls: HashSet::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Current listing page, 1-based
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn remaining(&self) -> usize {
        self.target - self.emitted
    }

    pub fn is_complete(&self) -> bool {
        self.emitted >= self.target
    }

    /// True once the current page is beyond `max_pages`.
    fn past_page_limit(&self, max_pages: Option<u32>) -> bool {
        max_pages.is_some_and(|max| self.page > max)
    }

    fn advance_page(&mut self) {
        self.page += 1;
    }

    /// Returns false if `url` was already claimed this run.
    fn claim_url(&mut self, url: &str) -> bool {
        self.seen_urls.insert(url.to_string())
    }

    fn record_emitted(&mut self) {
        debug_assert!(self.emitted < self.target);
        self.emitted = (self.emitted + 1).min(self.target);
    }
}

/// Why a run stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Emitted the requested number of records
    TargetReached,
    /// A listing page had no result rows
    Exhausted,
    /// Hit the configured `max_pages`
    PageLimit,
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub emitted: usize,
    pub target: usize,
    pub pages: u32,
    pub reason: StopReason,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

/// Everything a run needs, built once and passed down explicitly.
pub struct RunContext {
    pub config: ScraperConfig,
    pub client: FetchClient,
    pub sink: CsvSink,
    pub limiter: RateLimiter,
    base_url: Url,
}

impl RunContext {
    /// Validate `config`, build the HTTP session and open the output.
    pub fn open(config: ScraperConfig, columns: &'static [&'static str]) -> Result<Self> {
        config.validate()?;
        let base_url = config.base_url()?;
        let client = FetchClient::new(config.timeout())?;
        let sink = CsvSink::open(&config.output_path(), columns)?;
        let limiter = RateLimiter::new(config.delay_min, config.delay_max);

        Ok(Self {
            config,
            client,
            sink,
            limiter,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Close the output. Returns records written during this run.
    pub fn close(self) -> Result<usize> {
        self.sink.close()
    }
}

/// Run the search loop until the target is met or results run out.
pub async fn run(ctx: &mut RunContext, extractor: &dyn FieldExtractor) -> Result<RunSummary> {
    let started_at = Local::now();
    let mut session = SearchSession::new(ctx.config.topic.clone(), ctx.config.num_articles);

    ctx.client.reset_session()?;

    info!(
        topic = session.topic(),
        target = ctx.config.num_articles,
        source = extractor.name(),
        base_url = %ctx.base_url,
        "Starting search"
    );

    let reason = loop {
        if session.is_complete() {
            break StopReason::TargetReached;
        }
        if session.past_page_limit(ctx.config.max_pages) {
            info!(pages = session.pages_fetched, "Page limit reached");
            break StopReason::PageLimit;
        }

        let listing = fetch_listing(ctx, extractor, session.page()).await?;
        session.pages_fetched += 1;

        if listing.is_exhausted() {
            warn!(page = session.page(), "No results on this page, stopping");
            break StopReason::Exhausted;
        }

        info!(
            page = session.page(),
            rows = listing.rows_found,
            usable = listing.records.len(),
            "Parsed listing page"
        );

        for record in listing.records {
            if session.is_complete() {
                break;
            }
            if !session.claim_url(&record.url) {
                debug!(url = %record.url, "Already saved this run, skipping");
                continue;
            }

            let details = fetch_details(ctx, extractor, &record.url).await;
            let record = record.with_details(details);
            ctx.sink.append(&record)?;
            session.record_emitted();

            info!(
                saved = session.emitted(),
                target = ctx.config.num_articles,
                title = %truncate(&record.title, 60),
                "Saved article"
            );
            ctx.limiter.wait().await;
        }

        session.advance_page();
        if !session.is_complete() && !session.past_page_limit(ctx.config.max_pages) {
            ctx.limiter.wait().await;
        }
    };

    let summary = RunSummary {
        emitted: session.emitted(),
        target: ctx.config.num_articles,
        pages: session.pages_fetched,
        reason,
        started_at,
        finished_at: Local::now(),
    };

    if summary.emitted < summary.target {
        info!(
            emitted = summary.emitted,
            target = summary.target,
            "Results ran out before the target"
        );
    }
    info!(emitted = summary.emitted, pages = summary.pages, reason = ?summary.reason, "Search complete");

    Ok(summary)
}

/// Open the output, run the loop, and close the output on every path.
///
/// If `shutdown` resolves first the run is abandoned between awaits, the
/// output is closed and [`ScrapeError::Interrupted`] is returned.
pub async fn run_with_shutdown<F>(
    config: ScraperConfig,
    extractor: &dyn FieldExtractor,
    shutdown: F,
) -> Result<RunSummary>
where
    F: Future<Output = ()>,
{
    let mut ctx = RunContext::open(config, extractor.columns())?;

    let outcome = tokio::select! {
        biased;
        _ = shutdown => None,
        result = run(&mut ctx, extractor) => Some(result),
    };

    finish(outcome, ctx.close())
}

/// Combine the run outcome with the result of closing the output. A run
/// error takes precedence over a close error, which is only logged.
fn finish(outcome: Option<Result<RunSummary>>, closed: Result<usize>) -> Result<RunSummary> {
    match outcome {
        Some(Ok(summary)) => {
            closed?;
            Ok(summary)
        }
        Some(Err(e)) => {
            if let Err(close_err) = closed {
                warn!(error = %close_err, "Failed to close output after run error");
            }
            Err(e)
        }
        None => {
            let written = closed?;
            warn!(written, "Interrupted, output closed");
            Err(ScrapeError::Interrupted { written })
        }
    }
}

/// Fetch and parse one listing page, retrying network failures.
async fn fetch_listing(
    ctx: &RunContext,
    extractor: &dyn FieldExtractor,
    page: u32,
) -> Result<ListingPage> {
    let request = extractor.search_request(&ctx.base_url, &ctx.config.topic, page)?;
    let mut failures = 0u32;

    loop {
        info!(page, url = %request.url, "Requesting listing page");

        match ctx.client.fetch(&request.url, &request.params).await {
            Ok(fetched) => {
                if extractor.is_blocked(&fetched.body) {
                    error!(page, "Search engine served a CAPTCHA");
                    return Err(ScrapeError::Captcha);
                }
                return extractor.parse_listing(&fetched.body, &ctx.base_url);
            }
            Err(e) if e.is_network() => {
                failures += 1;
                error!(
                    page,
                    attempt = failures,
                    max_retries = ctx.config.max_retries,
                    error = %e,
                    "Network error fetching listing"
                );
                if failures >= ctx.config.max_retries {
                    return Err(ScrapeError::FetchExhausted {
                        page,
                        attempts: failures,
                    });
                }
                ctx.limiter.wait().await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Fetch the detail page; any failure yields empty detail fields.
async fn fetch_details(
    ctx: &RunContext,
    extractor: &dyn FieldExtractor,
    url: &str,
) -> ArticleDetails {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(url, error = %e, "Invalid detail URL");
            return ArticleDetails::default();
        }
    };

    info!(url, "Loading detail page");
    match ctx.client.fetch(&parsed, &[]).await {
        Ok(page) => extractor.parse_detail(&page),
        Err(e) => {
            warn!(url, error = %e, "Detail page unavailable, keeping listing fields");
            ArticleDetails::default()
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
