use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect, Client};
use url::Url;

use crate::app::{Result, TributaryError};
use crate::fetcher::{Fetcher, Page};

pub const DEFAULT_USER_AGENT: &str = concat!("tributary/", env!("CARGO_PKG_VERSION"));
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub struct HttpFetcher {
    client: Client,
    max_body: usize,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self> {
        // Redirects surface as non-2xx so a page cannot bounce us to an
        // arbitrary host.
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .gzip(true)
            .brotli(true)
            .redirect(redirect::Policy::none())
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            max_body: MAX_BODY_BYTES,
        })
    }

    #[cfg(test)]
    fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Page> {
        tracing::debug!(url = %url, "fetching page");

        let mut response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TributaryError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_body {
                return Err(TributaryError::Other(format!(
                    "response from {} exceeds {} bytes",
                    url, self.max_body
                )));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_body {
                return Err(TributaryError::Other(format!(
                    "response from {} exceeds {} bytes",
                    url, self.max_body
                )));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(Page {
            url: url.clone(),
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}
