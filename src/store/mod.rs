pub mod sqlite;
pub mod tracker;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{RunOutcome, ScraperRun, SourceRecord, SourceUpsert};

pub use sqlite::SqliteStore;
pub use tracker::{NoopTracker, RunHandle, RunTracker, StoreTracker};

pub trait Store: Send + Sync {
    // Source operations
    fn list_sources(&self) -> Result<Vec<SourceRecord>>;
    fn get_source_by_name(&self, name: &str) -> Result<Option<SourceRecord>>;
    fn upsert_source(&self, source: &SourceUpsert) -> Result<SourceRecord>;
    fn set_source_enabled(&self, name: &str, enabled: bool, notes: Option<&str>) -> Result<bool>;
    fn delete_source(&self, name: &str) -> Result<bool>;
    fn mark_source_scraped(&self, name: &str, at: DateTime<Utc>) -> Result<()>;

    // Run operations
    fn insert_run(&self, source_name: &str, started_at: DateTime<Utc>) -> Result<i64>;
    fn finish_run(&self, id: i64, outcome: &RunOutcome, finished_at: DateTime<Utc>) -> Result<()>;
    fn recent_runs(&self, source_name: Option<&str>, limit: usize) -> Result<Vec<ScraperRun>>;
}
