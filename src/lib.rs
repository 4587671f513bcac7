//! # scraper-standalone
//!
//! Scraping-resilience engine for hostile social platforms. The service
//! does not try to defeat platform bot detection beyond a browser-like
//! transport fingerprint and human-like pacing; what it guarantees is
//! bounded, observable degradation under blocking.
//!
//! ## Architecture
//!
//! - Tiered proxy pools with per-identity failure tracking and cooldowns
//! - Per-platform escalation policies (one-way tier ladder, pinned tier
//!   with session rotation)
//! - Token-bucket rate limiting in front of every outbound request
//! - Session/cookie lifecycle with TTL expiry and invalidation on auth
//!   failures
//! - Bounded retry/backoff around a classified response taxonomy
//! - Cursor pagination with a documented structural fallback when an
//!   upstream contract drifts
//!
//! Instagram and TikTok each get fully independent instances of every
//! stateful component; a blocking event on one platform never perturbs the
//! other.
//!
//! ## Example
//!
//! ```no_run
//! use scraper_standalone::config::ScraperConfig;
//! use scraper_standalone::orchestrator::build_instagram;
//! use scraper_standalone::types::ScrapeOptions;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ScraperConfig::from_env();
//!     let orchestrator = build_instagram(&config);
//!     let result = orchestrator
//!         .scrape_profile("natgeo", ScrapeOptions::default())
//!         .await;
//!     println!("{}: {:?}", result.username, result.status);
//! }
//! ```

pub mod config;
pub mod error;
pub mod modules;
pub mod orchestrator;
pub mod platforms;
pub mod server;
pub mod types;

pub use crate::error::{ScrapeError, ScraperResult};
pub use crate::orchestrator::{build_instagram, build_tiktok, ScrapeOrchestrator};
pub use crate::types::{ContentItem, Platform, Profile, ProfileScrape, ScrapeOptions, ScrapeStatus};
