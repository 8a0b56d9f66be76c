//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::{Result, TributaryError};
use crate::domain::{RawEvent, SourceConfig};
use crate::fetcher::{Fetcher, Page};
use crate::ingest::{BatchCounts, BatchReceipt, BatchStatus, Ingestor};

enum StubPage {
    Html(String),
    Status(u16),
}

/// Serves canned pages keyed by URL. Unknown URLs answer 404.
#[derive(Default)]
pub struct StubFetcher {
    pages: HashMap<String, StubPage>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages
            .insert(normalize(url), StubPage::Html(html.to_string()));
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.pages.insert(normalize(url), StubPage::Status(status));
        self
    }

    /// Sleep before answering every request.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &Url) -> Result<Page> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.pages.get(url.as_str()) {
            Some(StubPage::Html(body)) => Ok(Page {
                url: url.clone(),
                body: body.clone(),
            }),
            Some(StubPage::Status(status)) => Err(TributaryError::HttpStatus {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(TributaryError::HttpStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Records every submitted batch and reports each one as fully created.
#[derive(Default)]
pub struct RecordingIngestor {
    batches: Mutex<Vec<(String, Vec<RawEvent>)>>,
    reject_with: Option<u16>,
    pending: bool,
}

impl RecordingIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every submission with the given status.
    pub fn rejecting(status: u16) -> Self {
        Self {
            reject_with: Some(status),
            ..Default::default()
        }
    }

    /// Never report completion.
    pub fn pending() -> Self {
        Self {
            pending: true,
            ..Default::default()
        }
    }

    pub fn submit_calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    /// (source name, event count) per submitted batch.
    pub fn batches(&self) -> Vec<(String, usize)> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .map(|(name, events)| (name.clone(), events.len()))
            .collect()
    }
}

#[async_trait]
impl Ingestor for RecordingIngestor {
    async fn submit(&self, events: &[RawEvent], source: &SourceConfig) -> Result<BatchReceipt> {
        if let Some(status) = self.reject_with {
            return Err(TributaryError::Ingest {
                status,
                body: "rejected".into(),
            });
        }

        let mut batches = self.batches.lock().unwrap();
        batches.push((source.name.clone(), events.to_vec()));
        Ok(BatchReceipt {
            batch_id: format!("batch-{}", batches.len()),
            submitted: events.len(),
            ..Default::default()
        })
    }

    async fn await_completion(
        &self,
        batch_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<BatchStatus> {
        if self.pending {
            return Ok(BatchStatus::Pending);
        }

        let index = batch_id
            .trim_start_matches("batch-")
            .parse::<usize>()
            .map_err(|_| TributaryError::Other(format!("unknown batch {}", batch_id)))?;
        let batches = self.batches.lock().unwrap();
        let count = index
            .checked_sub(1)
            .and_then(|i| batches.get(i))
            .map(|(_, events)| events.len())
            .unwrap_or(0);

        Ok(BatchStatus::Completed(BatchCounts {
            status: "completed".into(),
            created: count,
            total: count,
            ..Default::default()
        }))
    }
}

#[derive(Clone)]
pub struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl MockResponse {
    pub fn ok(body: &str) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn render(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} Mock\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            self.body.len()
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("\r\n");
        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(self.body.as_bytes());
        bytes
    }
}

/// One-request-per-connection HTTP responder. Responses are served in
/// order; the last one repeats once the script runs out.
pub struct MockServer {
    addr: std::net::SocketAddr,
    requests: Arc<tokio::sync::Mutex<Vec<String>>>,
}

impl MockServer {
    pub async fn start(script: Vec<MockResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let log = requests.clone();
        tokio::spawn(async move {
            let mut served = 0usize;
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let request = read_request(&mut stream).await;
                log.lock().await.push(request);

                let response = script
                    .get(served)
                    .or_else(|| script.last())
                    .cloned()
                    .unwrap_or_else(|| MockResponse::status(500, "empty script"));
                served += 1;

                let _ = stream.write_all(&response.render()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return String::from_utf8_lossy(&buf).into_owned();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    String::from_utf8_lossy(&buf).into_owned()
}
