use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::app::TributaryError;
use crate::domain::SourceConfig;
use crate::scraper::{ScrapeOptions, ScrapeResult, Scraper};

pub const DEFAULT_WORKERS: usize = 3;

/// Scrape `sources` with at most `scraper.workers` in flight. Returns one
/// result per source in input order. Sources still waiting for a worker when
/// `cancel` fires are reported as cancelled.
pub(crate) async fn scrape_bounded(
    scraper: &Scraper,
    sources: Vec<SourceConfig>,
    opts: &ScrapeOptions,
    cancel: &CancellationToken,
) -> Vec<ScrapeResult> {
    let semaphore = Arc::new(Semaphore::new(scraper.workers));
    let mut handles = Vec::with_capacity(sources.len());

    for source in sources {
        let scraper = scraper.clone();
        let semaphore = semaphore.clone();
        let opts = opts.clone();
        let cancel = cancel.clone();
        let placeholder = ScrapeResult::new(&source, opts.dry_run);

        let handle = tokio::spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return ScrapeResult::failed(&source, opts.dry_run, TributaryError::Cancelled);
                }
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        return ScrapeResult::failed(
                            &source,
                            opts.dry_run,
                            TributaryError::Other(e.to_string()),
                        );
                    }
                },
            };

            scraper.run_source(&source, &opts, &cancel).await
        });

        handles.push((placeholder, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (mut placeholder, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!("Task join error: {}", e);
                placeholder.error = Some(TributaryError::Other(format!("worker failed: {}", e)));
                results.push(placeholder);
            }
        }
    }

    results
}
