use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::app::{Result, TributaryError};
use crate::domain::{RawEvent, SourceConfig};
use crate::ingest::{BatchCounts, BatchPayload, BatchReceipt, BatchStatus, Ingestor};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SNIPPET_CHARS: usize = 200;

/// Client for the batch ingestion API.
pub struct HttpIngestClient {
    client: Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl HttpIngestClient {
    pub fn new(base_url: &str, api_key: &str, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .gzip(true)
            .brotli(true)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        })
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    fn batch_url(&self) -> String {
        format!("{}/events:batch", self.base_url)
    }

    fn status_url(&self, batch_id: &str) -> String {
        format!("{}/batch-status/{}", self.base_url, batch_id)
    }

    /// One status request. `None` means the batch is not known yet.
    async fn check_status(&self, batch_id: &str) -> Result<Option<BatchCounts>> {
        let url = self.status_url(batch_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::OK => Ok(Some(response.json::<BatchCounts>().await?)),
            other => Err(TributaryError::HttpStatus {
                url,
                status: other.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl Ingestor for HttpIngestClient {
    async fn submit(&self, events: &[RawEvent], source: &SourceConfig) -> Result<BatchReceipt> {
        let payload = BatchPayload::new(events, source);

        let response = self
            .client
            .post(self.batch_url())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TributaryError::RateLimited(snippet(&body)));
        }
        if status != StatusCode::OK && status != StatusCode::ACCEPTED {
            return Err(TributaryError::Ingest {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }

        let mut receipt: BatchReceipt = serde_json::from_str(&body)?;
        if receipt.submitted == 0 {
            receipt.submitted = events.len();
        }

        tracing::debug!(
            source = %source.name,
            batch_id = %receipt.batch_id,
            submitted = receipt.submitted,
            "batch accepted"
        );

        Ok(receipt)
    }

    async fn await_completion(
        &self,
        batch_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchStatus> {
        let start = Instant::now();
        let deadline = start + self.poll_timeout;
        // The first check happens even when the timeout is shorter than the interval
        let mut wake = start + self.poll_interval.min(self.poll_timeout);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TributaryError::Cancelled),
                _ = tokio::time::sleep_until(wake) => {}
            }

            let counts = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TributaryError::Cancelled),
                counts = self.check_status(batch_id) => counts?,
            };

            match counts {
                Some(counts) if counts.is_terminal() => {
                    return Ok(BatchStatus::Completed(counts));
                }
                Some(counts) => {
                    tracing::debug!(batch_id, status = %counts.status, "batch in progress");
                }
                None => tracing::debug!(batch_id, "batch not yet known"),
            }

            wake = Instant::now() + self.poll_interval;
            if wake > deadline {
                tracing::info!(batch_id, "batch still processing after poll timeout");
                return Ok(BatchStatus::Pending);
            }
        }
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(SNIPPET_CHARS).collect()
}
