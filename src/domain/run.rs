use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Running,
        }
    }
}

/// One persisted execution of the per-source routine.
#[derive(Debug, Clone, PartialEq)]
pub struct ScraperRun {
    pub id: i64,
    pub source_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub events_found: usize,
    pub events_submitted: usize,
    pub events_created: usize,
    pub events_duplicate: usize,
    pub events_failed: usize,
    pub error_message: Option<String>,
}

/// Counts written when a run is finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub events_found: usize,
    pub events_submitted: usize,
    pub events_created: usize,
    pub events_duplicate: usize,
    pub events_failed: usize,
    pub error_message: Option<String>,
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        if self.error_message.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        }
    }
}
