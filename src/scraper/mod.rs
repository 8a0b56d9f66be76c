//! Scrape orchestration.
//!
//! # Architecture
//!
//! ```text
//! SourceCatalog → Scraper → Extractor (tier 1 | tier 2) → Ingestor
//!                    ↓
//!               RunTracker
//! ```
//!
//! Each source runs the same routine: begin tracking, extract, truncate to
//! the limit, submit (unless dry-run), optionally wait for the batch, finish
//! tracking. Failures land in that source's [`ScrapeResult`]; only
//! cancellation and failing to resolve sources are returned as errors.

mod parallel;
mod result;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::{Result, TributaryError};
use crate::domain::{SourceConfig, Tier};
use crate::extract::{self, ExtractError};
use crate::fetcher::Fetcher;
use crate::ingest::{BatchStatus, Ingestor};
use crate::sources::{SourceCatalog, DEFAULT_SOURCES_DIR};
use crate::store::RunTracker;

pub use parallel::DEFAULT_WORKERS;
pub use result::{RunSummary, ScrapeResult};

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Extract and count, but never submit.
    pub dry_run: bool,
    /// Maximum events submitted per source; 0 means no limit.
    pub limit: usize,
    /// Where source files live when the store has none.
    pub sources_dir: PathBuf,
    /// Poll the batch status endpoint after submitting.
    pub await_completion: bool,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            limit: 0,
            sources_dir: PathBuf::from(DEFAULT_SOURCES_DIR),
            await_completion: true,
        }
    }
}

#[derive(Clone)]
pub struct Scraper {
    fetcher: Arc<dyn Fetcher>,
    ingestor: Arc<dyn Ingestor>,
    tracker: Arc<dyn RunTracker>,
    catalog: SourceCatalog,
    workers: usize,
}

impl Scraper {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        ingestor: Arc<dyn Ingestor>,
        tracker: Arc<dyn RunTracker>,
        catalog: SourceCatalog,
    ) -> Self {
        Self {
            fetcher,
            ingestor,
            tracker,
            catalog,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Scrape one ad hoc URL as a structured-data source named after its host.
    pub async fn scrape_url(
        &self,
        raw_url: &str,
        opts: &ScrapeOptions,
        cancel: &CancellationToken,
    ) -> Result<ScrapeResult> {
        let url = Url::parse(raw_url)?;
        let host = url
            .host_str()
            .ok_or_else(|| TributaryError::InvalidSource(format!("{}: URL has no host", raw_url)))?
            .to_string();

        let source = SourceConfig {
            max_pages: 1,
            ..SourceConfig::new(host, url.as_str(), Tier::StructuredData)
        };
        source.validate()?;

        let result = self.run_source(&source, opts, cancel).await;
        if result.is_cancelled() {
            return Err(TributaryError::Cancelled);
        }
        if result.is_success() && result.events_found == 0 {
            tracing::warn!(
                url = %url,
                "no structured event data found; no extraction possible without a selector config"
            );
        }
        Ok(result)
    }

    /// Scrape one configured source by name, ignoring case.
    pub async fn scrape_source(
        &self,
        name: &str,
        opts: &ScrapeOptions,
        cancel: &CancellationToken,
    ) -> Result<ScrapeResult> {
        let source = self.catalog.find(name, &opts.sources_dir)?;
        if !source.enabled {
            return Err(TributaryError::SourceDisabled(source.name));
        }

        let result = self.run_source(&source, opts, cancel).await;
        if result.is_cancelled() {
            return Err(TributaryError::Cancelled);
        }
        Ok(result)
    }

    /// Scrape every enabled source. Returns one result per source, ordered
    /// by source name.
    pub async fn scrape_all(
        &self,
        opts: &ScrapeOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScrapeResult>> {
        let sources: Vec<SourceConfig> = self
            .catalog
            .resolve(&opts.sources_dir)?
            .into_iter()
            .filter(|s| s.enabled)
            .collect();

        if sources.is_empty() {
            tracing::warn!(dir = %opts.sources_dir.display(), "no enabled sources found");
            return Ok(Vec::new());
        }

        tracing::info!(
            sources = sources.len(),
            workers = self.workers,
            dry_run = opts.dry_run,
            "starting scrape run"
        );

        Ok(parallel::scrape_bounded(self, sources, opts, cancel).await)
    }

    /// The per-source routine shared by every entry point. Never fails; the
    /// error is stored on the result.
    pub(crate) async fn run_source(
        &self,
        source: &SourceConfig,
        opts: &ScrapeOptions,
        cancel: &CancellationToken,
    ) -> ScrapeResult {
        let mut result = ScrapeResult::new(source, opts.dry_run);
        let handle = self.tracker.begin(&source.name);

        if let Err(e) = self.scrape_into(&mut result, source, opts, cancel).await {
            result.error = Some(e);
        }

        self.tracker.finish(handle, &result.outcome());
        if result.is_success() && !opts.dry_run && result.batch_id.is_some() {
            self.tracker.mark_scraped(&source.name);
        }

        match &result.error {
            None => tracing::info!(
                source = %source.name,
                found = result.events_found,
                submitted = result.events_submitted,
                created = result.events_created,
                duplicates = result.events_duplicate,
                failed = result.events_failed,
                pending = result.pending,
                "source scraped"
            ),
            Some(e) => tracing::warn!(source = %source.name, error = %e, "source failed"),
        }

        result
    }

    async fn scrape_into(
        &self,
        result: &mut ScrapeResult,
        source: &SourceConfig,
        opts: &ScrapeOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        source.validate()?;

        let extractor = extract::for_tier(source.tier, self.fetcher.clone());
        let mut events = match extractor.extract(source, cancel).await {
            Ok(extraction) => {
                result.pages_fetched = extraction.pages_fetched;
                extraction.events
            }
            Err(ExtractError { partial, error }) => {
                result.pages_fetched = partial.pages_fetched;
                result.events_found = partial.events.len();
                return Err(error);
            }
        };

        result.events_found = events.len();
        if opts.limit > 0 {
            events.truncate(opts.limit);
        }

        if opts.dry_run {
            result.events_submitted = events.len();
            return Ok(());
        }
        if events.is_empty() {
            return Ok(());
        }

        let receipt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TributaryError::Cancelled),
            receipt = self.ingestor.submit(&events, source) => receipt?,
        };
        result.events_submitted = receipt.submitted;
        result.batch_id = Some(receipt.batch_id.clone());

        if !opts.await_completion {
            result.pending = true;
            return Ok(());
        }

        match self.ingestor.await_completion(&receipt.batch_id, cancel).await? {
            BatchStatus::Completed(counts) => {
                if counts.status == "failed" {
                    tracing::warn!(source = %source.name, batch_id = %receipt.batch_id, "batch reported failed");
                }
                result.events_created = counts.created;
                result.events_duplicate = counts.duplicates;
                result.events_failed = counts.failed;
            }
            BatchStatus::Pending => result.pending = true,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceUpsert;
    use crate::store::{NoopTracker, SqliteStore, Store, StoreTracker};
    use crate::testing::{RecordingIngestor, StubFetcher};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn json_ld_page(names: &[&str]) -> String {
        let events: Vec<String> = names
            .iter()
            .map(|n| format!(r#"{{"@type":"Event","name":"{}","startDate":"2026-06-01"}}"#, n))
            .collect();
        format!(
            r#"<script type="application/ld+json">[{}]</script>"#,
            events.join(",")
        )
    }

    fn write_source(dir: &Path, name: &str, url: &str) {
        std::fs::write(
            dir.join(format!("{}.toml", name)),
            format!("name = \"{}\"\nurl = \"{}\"\ntier = 2\n", name, url),
        )
        .unwrap();
    }

    fn opts(dir: &Path) -> ScrapeOptions {
        ScrapeOptions {
            sources_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn scraper(fetcher: Arc<StubFetcher>, ingestor: Arc<RecordingIngestor>) -> Scraper {
        Scraper::new(
            fetcher,
            ingestor,
            Arc::new(NoopTracker),
            SourceCatalog::new(None),
        )
    }

    #[tokio::test]
    async fn test_scrape_all_isolates_failures() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "alpha", "https://a.example.com/");
        write_source(dir.path(), "bravo", "https://b.example.com/");
        write_source(dir.path(), "charlie", "https://c.example.com/");

        let fetcher = Arc::new(
            StubFetcher::new()
                .page("https://a.example.com/", &json_ld_page(&["A1", "A2"]))
                .status("https://b.example.com/", 502)
                .page("https://c.example.com/", &json_ld_page(&["C1"])),
        );
        let ingestor = Arc::new(RecordingIngestor::new());
        let scraper = scraper(fetcher, ingestor.clone());

        let results = scraper
            .scrape_all(&opts(dir.path()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        let names: Vec<_> = results.iter().map(|r| r.source_name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "bravo", "charlie"]);
        assert!(results[0].is_success());
        assert_eq!(results[1].error.as_ref().and_then(|e| e.status()), Some(502));
        assert!(results[2].is_success());

        let summary = RunSummary::from_results(&results);
        assert!(!summary.succeeded());
        assert_eq!(summary.events_found, 3);
        assert_eq!(summary.events_created, 3);
        assert_eq!(ingestor.submit_calls(), 2);
    }

    #[tokio::test]
    async fn test_scrape_all_skips_disabled_sources() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "alpha", "https://a.example.com/");
        std::fs::write(
            dir.path().join("off.toml"),
            "name = \"off\"\nurl = \"https://off.example.com/\"\nenabled = false\n",
        )
        .unwrap();

        let fetcher = Arc::new(StubFetcher::new().page("https://a.example.com/", &json_ld_page(&["A"])));
        let scraper = scraper(fetcher.clone(), Arc::new(RecordingIngestor::new()));

        let results = scraper
            .scrape_all(&opts(dir.path()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_never_submits() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "alpha", "https://a.example.com/");
        let fetcher = Arc::new(
            StubFetcher::new().page("https://a.example.com/", &json_ld_page(&["1", "2", "3", "4", "5"])),
        );
        let ingestor = Arc::new(RecordingIngestor::new());
        let scraper = scraper(fetcher, ingestor.clone());

        let limited = ScrapeOptions {
            dry_run: true,
            limit: 2,
            ..opts(dir.path())
        };
        let result = scraper
            .scrape_source("alpha", &limited, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.events_found, 5);
        assert_eq!(result.events_submitted, 2);
        assert!(result.dry_run);

        let unlimited = ScrapeOptions {
            dry_run: true,
            ..opts(dir.path())
        };
        let result = scraper
            .scrape_source("alpha", &unlimited, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.events_submitted, 5);

        assert_eq!(ingestor.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_limit_truncates_before_submission() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "alpha", "https://a.example.com/");
        let fetcher = Arc::new(
            StubFetcher::new().page("https://a.example.com/", &json_ld_page(&["1", "2", "3"])),
        );
        let ingestor = Arc::new(RecordingIngestor::new());
        let scraper = scraper(fetcher, ingestor.clone());

        let result = scraper
            .scrape_source(
                "alpha",
                &ScrapeOptions {
                    limit: 2,
                    ..opts(dir.path())
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.events_found, 3);
        assert_eq!(result.events_submitted, 2);
        assert_eq!(result.events_created, 2);
        assert_eq!(ingestor.batches(), vec![("alpha".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_unknown_source_is_call_level_error() {
        let dir = TempDir::new().unwrap();
        let scraper = scraper(Arc::new(StubFetcher::new()), Arc::new(RecordingIngestor::new()));

        let err = scraper
            .scrape_source("unknown-name", &opts(dir.path()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TributaryError::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_disabled_source_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("off.toml"),
            "name = \"off\"\nurl = \"https://off.example.com/\"\nenabled = false\n",
        )
        .unwrap();
        let scraper = scraper(Arc::new(StubFetcher::new()), Arc::new(RecordingIngestor::new()));

        let err = scraper
            .scrape_source("OFF", &opts(dir.path()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TributaryError::SourceDisabled(_)));
    }

    #[tokio::test]
    async fn test_zero_events_skips_submission() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "alpha", "https://a.example.com/");
        let fetcher = Arc::new(StubFetcher::new().page("https://a.example.com/", "<p>none</p>"));
        let ingestor = Arc::new(RecordingIngestor::new());
        let scraper = scraper(fetcher, ingestor.clone());

        let result = scraper
            .scrape_source("alpha", &opts(dir.path()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.events_found, 0);
        assert_eq!(ingestor.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_submission_failure_recorded_on_result() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "alpha", "https://a.example.com/");
        let fetcher = Arc::new(StubFetcher::new().page("https://a.example.com/", &json_ld_page(&["A"])));
        let scraper = scraper(fetcher, Arc::new(RecordingIngestor::rejecting(401)));

        let result = scraper
            .scrape_source("alpha", &opts(dir.path()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.events_found, 1);
        assert_eq!(result.events_submitted, 0);
        assert_eq!(result.error.as_ref().and_then(|e| e.status()), Some(401));
    }

    #[tokio::test]
    async fn test_pending_batch_reported() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "alpha", "https://a.example.com/");
        let fetcher = Arc::new(StubFetcher::new().page("https://a.example.com/", &json_ld_page(&["A"])));
        let scraper = scraper(fetcher, Arc::new(RecordingIngestor::pending()));

        let result = scraper
            .scrape_source("alpha", &opts(dir.path()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_success());
        assert!(result.pending);
        assert_eq!(result.batch_id.as_deref(), Some("batch-1"));
        assert_eq!(result.events_created, 0);
    }

    #[tokio::test]
    async fn test_no_wait_leaves_batch_pending() {
        let dir = TempDir::new().unwrap();
        write_source(dir.path(), "alpha", "https://a.example.com/");
        let fetcher = Arc::new(StubFetcher::new().page("https://a.example.com/", &json_ld_page(&["A"])));
        let scraper = scraper(fetcher, Arc::new(RecordingIngestor::new()));

        let result = scraper
            .scrape_source(
                "alpha",
                &ScrapeOptions {
                    await_completion: false,
                    ..opts(dir.path())
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.pending);
        assert_eq!(result.events_submitted, 1);
    }

    #[tokio::test]
    async fn test_scrape_url_uses_host_as_name() {
        let fetcher = Arc::new(
            StubFetcher::new().page("https://venue.example.com/events", &json_ld_page(&["Gig"])),
        );
        let scraper = scraper(fetcher, Arc::new(RecordingIngestor::new()));

        let result = scraper
            .scrape_url(
                "https://venue.example.com/events",
                &ScrapeOptions {
                    dry_run: true,
                    ..Default::default()
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.source_name, "venue.example.com");
        assert_eq!(result.tier, Tier::StructuredData);
        assert_eq!(result.events_found, 1);
    }

    #[tokio::test]
    async fn test_scrape_url_rejects_bad_urls() {
        let scraper = scraper(Arc::new(StubFetcher::new()), Arc::new(RecordingIngestor::new()));
        let cancel = CancellationToken::new();
        let opts = ScrapeOptions::default();

        assert!(scraper.scrape_url("not a url", &opts, &cancel).await.is_err());
        assert!(scraper.scrape_url("ftp://example.com/x", &opts, &cancel).await.is_err());
    }

    #[tokio::test]
    async fn test_tier1_without_event_list_fails_source_only() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("alpha.toml"),
            "name = \"alpha\"\nurl = \"https://a.example.com/\"\ntier = 1\n",
        )
        .unwrap();

        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let config = SourceConfig::new("alpha", "https://a.example.com/", Tier::Selector);
        store
            .upsert_source(&SourceUpsert::from_config(&config).unwrap())
            .unwrap();

        let fetcher = Arc::new(StubFetcher::new());
        let scraper = Scraper::new(
            fetcher.clone(),
            Arc::new(RecordingIngestor::new()),
            Arc::new(NoopTracker),
            SourceCatalog::new(Some(store)),
        );

        let results = scraper
            .scrape_all(&opts(dir.path()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0].error,
            Some(TributaryError::InvalidSource(_))
        ));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_runs_tracked_in_store() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let config = SourceConfig::new("alpha", "https://a.example.com/", Tier::StructuredData);
        store
            .upsert_source(&SourceUpsert::from_config(&config).unwrap())
            .unwrap();

        let fetcher = Arc::new(StubFetcher::new().page("https://a.example.com/", &json_ld_page(&["A", "B"])));
        let scraper = Scraper::new(
            fetcher,
            Arc::new(RecordingIngestor::new()),
            Arc::new(StoreTracker::new(store.clone())),
            SourceCatalog::new(Some(store.clone())),
        );

        scraper
            .scrape_source("alpha", &opts(dir.path()), &CancellationToken::new())
            .await
            .unwrap();

        let runs = store.recent_runs(Some("alpha"), 5).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].events_found, 2);
        assert_eq!(runs[0].events_created, 2);
        assert!(store
            .get_source_by_name("alpha")
            .unwrap()
            .unwrap()
            .last_scraped_at
            .is_some());
    }

    #[tokio::test]
    async fn test_cancel_mid_run_reports_every_source() {
        let dir = TempDir::new().unwrap();
        let mut fetcher = StubFetcher::new().delay(Duration::from_millis(500));
        for i in 0..5 {
            let url = format!("https://s{}.example.com/", i);
            write_source(dir.path(), &format!("source-{}", i), &url);
            fetcher = fetcher.page(&url, &json_ld_page(&["E"]));
        }

        let scraper = scraper(Arc::new(fetcher), Arc::new(RecordingIngestor::new()))
            .with_workers(2);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let results = scraper.scrape_all(&opts(dir.path()), &cancel).await.unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().filter(|r| r.is_success()).count() < 5);
        assert!(results.iter().all(|r| r.is_cancelled()));
    }

    #[test]
    fn test_workers_clamped() {
        let scraper = scraper(Arc::new(StubFetcher::new()), Arc::new(RecordingIngestor::new()));
        assert_eq!(scraper.workers(), DEFAULT_WORKERS);
        assert_eq!(scraper.with_workers(0).workers(), 1);
    }
}
