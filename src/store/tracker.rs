use std::sync::Arc;

use chrono::Utc;

use crate::domain::RunOutcome;
use crate::store::Store;

/// Identifies a run started with [`RunTracker::begin`]. Empty when the run
/// was not recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunHandle(Option<i64>);

impl RunHandle {
    pub fn id(&self) -> Option<i64> {
        self.0
    }
}

/// Run bookkeeping. Implementations log their own failures and never return
/// them to the scrape.
pub trait RunTracker: Send + Sync {
    fn begin(&self, source_name: &str) -> RunHandle;
    fn finish(&self, handle: RunHandle, outcome: &RunOutcome);

    /// Stamp `last_scraped_at` after a successful submission.
    fn mark_scraped(&self, _source_name: &str) {}
}

/// Used when no store is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracker;

impl RunTracker for NoopTracker {
    fn begin(&self, _source_name: &str) -> RunHandle {
        RunHandle::default()
    }

    fn finish(&self, _handle: RunHandle, _outcome: &RunOutcome) {}
}

pub struct StoreTracker {
    store: Arc<dyn Store>,
}

impl StoreTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl RunTracker for StoreTracker {
    fn begin(&self, source_name: &str) -> RunHandle {
        match self.store.insert_run(source_name, Utc::now()) {
            Ok(id) => RunHandle(Some(id)),
            Err(e) => {
                tracing::warn!(source = %source_name, error = %e, "failed to record run start");
                RunHandle::default()
            }
        }
    }

    fn finish(&self, handle: RunHandle, outcome: &RunOutcome) {
        let Some(id) = handle.id() else {
            return;
        };
        if let Err(e) = self.store.finish_run(id, outcome, Utc::now()) {
            tracing::warn!(run_id = id, error = %e, "failed to record run result");
        }
    }

    fn mark_scraped(&self, source_name: &str) {
        if let Err(e) = self.store.mark_source_scraped(source_name, Utc::now()) {
            tracing::warn!(source = %source_name, error = %e, "failed to update last_scraped_at");
        }
    }
}
