pub mod event;
pub mod run;
pub mod source;

pub use event::RawEvent;
pub use run::{RunOutcome, RunStatus, ScraperRun};
pub use source::{SelectorSet, SourceConfig, SourceRecord, SourceUpsert, Tier};
