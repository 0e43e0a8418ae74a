//! elibscrape - eLibrary.ru / Google Scholar article scraper
//!
//! ## Usage
//!
//! ```bash
//! elibscrape search "multiplayer game engine architecture" -n 20
//! elibscrape search "netcode" --source gscholar --filter-keywords multiplayer,network
//! elibscrape config --config run.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use elibscrape::config::{ScraperConfig, Source};
use elibscrape::{extractors, pipeline, ScrapeError};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Incremental eLibrary.ru / Google Scholar article scraper
#[derive(Parser)]
#[command(name = "elibscrape")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// JSON configuration file; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search and append results to the output CSV
    Search {
        /// Search topic
        topic: Option<String>,

        /// Search source: elibrary, elibrary-index or gscholar
        #[arg(long, value_parser = ["elibrary", "elibrary-index", "gscholar"])]
        source: Option<String>,

        /// Number of articles to collect
        #[arg(short = 'n', long)]
        num_articles: Option<usize>,

        /// Output CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Minimum delay between requests (seconds)
        #[arg(long)]
        delay_min: Option<f64>,

        /// Maximum delay between requests (seconds)
        #[arg(long)]
        delay_max: Option<f64>,

        /// Request timeout (seconds)
        #[arg(long)]
        timeout: Option<u64>,

        /// Search engine base URL (mirror sites)
        #[arg(long)]
        base_url: Option<String>,

        /// Consecutive listing fetch failures before giving up
        #[arg(long)]
        max_retries: Option<u32>,

        /// Stop after this many listing pages
        #[arg(long)]
        max_pages: Option<u32>,

        /// Keep only titles containing one of these (comma-separated, gscholar)
        #[arg(long, value_delimiter = ',')]
        filter_keywords: Option<Vec<String>>,
    },

    /// Print the effective configuration as JSON
    Config,
}

/// Values given on the command line, applied over the file configuration
struct Overrides {
    topic: Option<String>,
    source: Option<String>,
    num_articles: Option<usize>,
    output: Option<PathBuf>,
    delay_min: Option<f64>,
    delay_max: Option<f64>,
    timeout: Option<u64>,
    base_url: Option<String>,
    max_retries: Option<u32>,
    max_pages: Option<u32>,
    filter_keywords: Option<Vec<String>>,
}

impl Overrides {
    fn apply(self, mut config: ScraperConfig) -> Result<ScraperConfig> {
        if let Some(source) = self.source {
            config.source = source.parse::<Source>()?;
        }
        if let Some(topic) = self.topic {
            config.topic = topic;
        }
        if let Some(n) = self.num_articles {
            config.num_articles = n;
        }
        if let Some(output) = self.output {
            config.output_path = Some(output);
        }
        if let Some(min) = self.delay_min {
            config.delay_min = min;
        }
        if let Some(max) = self.delay_max {
            config.delay_max = max;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(url) = self.base_url {
            config.base_url = Some(url);
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(pages) = self.max_pages {
            config.max_pages = Some(pages);
        }
        if let Some(keywords) = self.filter_keywords {
            config.filter_keywords = keywords;
        }
        Ok(config)
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.log_json {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    let base_config = match &cli.config {
        Some(path) => ScraperConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ScraperConfig::default(),
    };

    match cli.command {
        Commands::Search {
            topic,
            source,
            num_articles,
            output,
            delay_min,
            delay_max,
            timeout,
            base_url,
            max_retries,
            max_pages,
            filter_keywords,
        } => {
            let config = Overrides {
                topic,
                source,
                num_articles,
                output,
                delay_min,
                delay_max,
                timeout,
                base_url,
                max_retries,
                max_pages,
                filter_keywords,
            }
            .apply(base_config)?;
            run_search(config).await
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&base_config)?);
            Ok(())
        }
    }
}

// ============================================================================
// Search
// ============================================================================

async fn run_search(config: ScraperConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let output = config.output_path();
    let extractor = extractors::for_config(&config);

    println!("Topic:  {}", config.topic);
    println!("Source: {}", extractor.name());
    println!("Output: {}", output.display());

    info!(target_count = config.num_articles, "Scraper starting");

    match pipeline::run_with_shutdown(config, extractor.as_ref(), ctrl_c()).await {
        Ok(summary) => {
            let elapsed = summary.finished_at - summary.started_at;
            println!(
                "\nSaved {} / {} articles from {} page(s) in {}s ({:?}).",
                summary.emitted,
                summary.target,
                summary.pages,
                elapsed.num_seconds(),
                summary.reason
            );
            Ok(())
        }
        Err(ScrapeError::Interrupted { written }) => {
            println!("\nInterrupted. {} article(s) saved to {}.", written, output.display());
            std::process::exit(130);
        }
        Err(e) => {
            error!(error = %e, "Scrape failed");
            Err(e).context("Scrape failed")
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
