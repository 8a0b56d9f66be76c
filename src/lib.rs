//! # Tributary
//!
//! Scrapes community event listings from configured websites and submits
//! them in batches to an event ingestion API.
//!
//! ## Architecture
//!
//! ```text
//! Sources → Fetcher → Extractor → Normalizer → Ingestor
//!                          ↓
//!                  Store (run history)
//! ```
//!
//! - Tier 1 sources are scraped with operator-written CSS selectors.
//! - Tier 2 sources publish schema.org JSON-LD and need no selectors.
//!
//! ## Quick Start
//!
//! ```bash
//! # Scrape a page that publishes JSON-LD events, without submitting
//! tributary scrape url https://venue.example.com/events --dry-run
//!
//! # Load source files into the database
//! tributary sources sync --dir configs/sources
//!
//! # Scrape every enabled source, three at a time
//! tributary scrape all
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the store,
/// fetcher, ingestion client and scraper.
pub mod app;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/tributary/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`SourceConfig`](domain::SourceConfig): one scrape target
/// - [`RawEvent`](domain::RawEvent): an extracted, unvalidated event
/// - [`ScraperRun`](domain::ScraperRun): one tracked execution
pub mod domain;

/// Tier 1 (CSS selector) and tier 2 (JSON-LD) extraction.
pub mod extract;

/// HTML page fetching, with robots.txt checks and per-host pacing.
pub mod fetcher;

/// Batch submission and status polling against the ingestion API.
pub mod ingest;

/// Text cleanup, URL resolution and JSON-LD field mapping.
pub mod normalizer;

/// Per-source orchestration with bounded parallelism.
pub mod scraper;

/// Source config files and the store-backed catalog.
pub mod sources;

/// SQLite persistence for sources and runs.
pub mod store;

#[cfg(test)]
mod testing;
