//! # elibscrape
//!
//! Incremental bibliographic scraper for eLibrary.ru and Google Scholar.
//!
//! ## Modules
//!
//! - [`pipeline`] - Paginated search loop and run context
//! - [`extractors`] - Per-site listing and detail page parsing
//! - [`client`] - HTTP session with rotating header profiles
//! - [`sink`] - Append-only CSV output
//! - [`rate_limit`] - Randomized request delays
//! - [`normalize`] - Text cleanup
//! - [`record`] - Output record types
//! - [`config`] - Run configuration
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use elibscrape::{config::ScraperConfig, extractors, pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ScraperConfig {
//!         topic: "multiplayer game engine".to_string(),
//!         num_articles: 10,
//!         ..Default::default()
//!     };
//!     let extractor = extractors::for_config(&config);
//!     let summary =
//!         pipeline::run_with_shutdown(config, extractor.as_ref(), std::future::pending()).await?;
//!     println!("Saved {} articles", summary.emitted);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod extractors;
pub mod normalize;
pub mod pipeline;
pub mod rate_limit;
pub mod record;
pub mod sink;

pub use error::{Result, ScrapeError};
