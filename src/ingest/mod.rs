pub mod http_client;
pub mod payload;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tokio_util::sync::CancellationToken;

use crate::app::Result;
use crate::domain::{RawEvent, SourceConfig};

pub use http_client::HttpIngestClient;
pub use payload::{BatchPayload, EventInput};

/// Acknowledgement returned when a batch is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BatchReceipt {
    pub batch_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub submitted: usize,
    #[serde(default)]
    pub status_url: Option<String>,
}

/// Per-outcome counts reported by the batch status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BatchCounts {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created: usize,
    #[serde(default)]
    pub duplicates: usize,
    #[serde(default)]
    pub failed: usize,
    #[serde(default)]
    pub total: usize,
}

impl BatchCounts {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "failed")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    Completed(BatchCounts),
    /// The polling deadline elapsed before the batch finished.
    Pending,
}

#[async_trait]
pub trait Ingestor: Send + Sync {
    /// Submit one batch of events scraped from `source`.
    async fn submit(&self, events: &[RawEvent], source: &SourceConfig) -> Result<BatchReceipt>;

    /// Poll the status endpoint until the batch is terminal or the deadline
    /// passes.
    async fn await_completion(
        &self,
        batch_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchStatus>;
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
