//! Extraction strategies, one per source tier.

pub mod selector;
pub mod structured;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::app::TributaryError;
use crate::domain::{RawEvent, SourceConfig, Tier};
use crate::fetcher::Fetcher;

pub use selector::SelectorExtractor;
pub use structured::StructuredExtractor;

#[derive(Debug, Default)]
pub struct Extraction {
    pub events: Vec<RawEvent>,
    pub pages_fetched: usize,
}

/// Extraction failed part-way. `partial` holds what was gathered first.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ExtractError {
    pub partial: Extraction,
    #[source]
    pub error: TributaryError,
}

impl ExtractError {
    pub fn new(partial: Extraction, error: impl Into<TributaryError>) -> Self {
        Self {
            partial,
            error: error.into(),
        }
    }
}

impl From<TributaryError> for ExtractError {
    fn from(error: TributaryError) -> Self {
        Self::new(Extraction::default(), error)
    }
}

pub type ExtractResult = std::result::Result<Extraction, ExtractError>;

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, source: &SourceConfig, cancel: &CancellationToken) -> ExtractResult;
}

/// Pick the extraction strategy for a source's tier.
pub fn for_tier(tier: Tier, fetcher: Arc<dyn Fetcher>) -> Box<dyn Extractor> {
    match tier {
        Tier::Selector => Box::new(SelectorExtractor::new(fetcher)),
        Tier::StructuredData => Box::new(StructuredExtractor::new(fetcher)),
    }
}
