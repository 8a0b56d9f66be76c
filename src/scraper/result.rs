use crate::app::TributaryError;
use crate::domain::{RunOutcome, SourceConfig, Tier};

/// Outcome of scraping one source.
#[derive(Debug)]
pub struct ScrapeResult {
    pub source_name: String,
    pub source_url: String,
    pub tier: Tier,
    pub dry_run: bool,
    pub pages_fetched: usize,
    pub events_found: usize,
    /// Events sent to ingestion, or the number that would be sent on a dry run.
    pub events_submitted: usize,
    pub events_created: usize,
    pub events_duplicate: usize,
    pub events_failed: usize,
    pub batch_id: Option<String>,
    /// Submitted, but the batch had not finished when we stopped waiting.
    pub pending: bool,
    pub error: Option<TributaryError>,
}

impl ScrapeResult {
    pub fn new(source: &SourceConfig, dry_run: bool) -> Self {
        Self {
            source_name: source.name.clone(),
            source_url: source.url.clone(),
            tier: source.tier,
            dry_run,
            pages_fetched: 0,
            events_found: 0,
            events_submitted: 0,
            events_created: 0,
            events_duplicate: 0,
            events_failed: 0,
            batch_id: None,
            pending: false,
            error: None,
        }
    }

    pub fn failed(source: &SourceConfig, dry_run: bool, error: TributaryError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(source, dry_run)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(TributaryError::is_cancelled)
    }

    pub fn outcome(&self) -> RunOutcome {
        RunOutcome {
            events_found: self.events_found,
            events_submitted: self.events_submitted,
            events_created: self.events_created,
            events_duplicate: self.events_duplicate,
            events_failed: self.events_failed,
            error_message: self.error.as_ref().map(ToString::to_string),
        }
    }
}

/// Totals across a run. The run succeeded only if every source did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sources: usize,
    pub failed_sources: usize,
    pub events_found: usize,
    pub events_submitted: usize,
    pub events_created: usize,
    pub events_duplicate: usize,
    pub events_failed: usize,
}

impl RunSummary {
    pub fn from_results(results: &[ScrapeResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            acc.sources += 1;
            if !r.is_success() {
                acc.failed_sources += 1;
            }
            acc.events_found += r.events_found;
            acc.events_submitted += r.events_submitted;
            acc.events_created += r.events_created;
            acc.events_duplicate += r.events_duplicate;
            acc.events_failed += r.events_failed;
            acc
        })
    }

    pub fn succeeded(&self) -> bool {
        self.failed_sources == 0
    }
}
