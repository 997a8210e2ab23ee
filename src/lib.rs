//! PlaceScrape - map-search listing extraction run as asynchronous jobs
//!
//! This library provides:
//! - A job registry and a bounded dispatcher running one browser session per job
//! - Scroll-until-enough-or-stall discovery of result feed entries
//! - Per-field and per-record fault isolated record extraction
//! - JSON result storage plus CSV/JSON export
//! - An optional HTTP API (feature `api`) and Playwright engine (feature `browser`)

pub mod core;
pub mod config;
pub mod storage;
pub mod scraper;
pub mod export;
pub mod error;
pub mod logging;

#[cfg(feature = "api")]
pub mod api;

// Re-export main types for convenience
pub use crate::core::{Job, JobResults, JobStatus, PlaceScrapeService};
pub use crate::config::AppConfig;
pub use crate::error::{PlaceScrapeError, PlaceScrapeResult};
pub use crate::scraper::Record;
