pub mod http_fetcher;
pub mod polite;
pub mod robots;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::{Result, TributaryError};

pub use http_fetcher::HttpFetcher;
pub use polite::PoliteFetcher;
pub use robots::RobotsTxt;

/// A fetched HTML document.
#[derive(Debug, Clone)]
pub struct Page {
    /// URL the document was served from; relative links resolve against it.
    pub url: Url,
    pub body: String,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Page>;
}

/// Fetch `url`, giving up as soon as `cancel` fires.
pub async fn fetch_with_cancel(
    fetcher: &dyn Fetcher,
    url: &Url,
    cancel: &CancellationToken,
) -> Result<Page> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TributaryError::Cancelled),
        page = fetcher.fetch(url) => page,
    }
}
