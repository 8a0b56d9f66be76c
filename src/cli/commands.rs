use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::{AppContext, Result, TributaryError};
use crate::cli::{ScrapeArgs, SelectorFlags};
use crate::domain::{SelectorSet, SourceConfig, Tier};
use crate::extract::selector::SelectorExtractor;
use crate::fetcher::fetch_with_cancel;
use crate::scraper::{RunSummary, ScrapeResult};
use crate::sources;
use crate::store::Store;

fn sources_dir(ctx: &AppContext, dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(|| ctx.config.scrape.sources_dir.clone())
}

/// Returns whether the source succeeded.
pub async fn scrape_url(
    ctx: &AppContext,
    url: &str,
    args: &ScrapeArgs,
    cancel: &CancellationToken,
) -> Result<bool> {
    let opts = args.to_options(&ctx.config.scrape.sources_dir, ctx.config.ingest.await_completion);
    let result = ctx.scraper.scrape_url(url, &opts, cancel).await?;
    print_single_result(&result);
    Ok(result.is_success())
}

pub async fn scrape_source(
    ctx: &AppContext,
    name: &str,
    args: &ScrapeArgs,
    cancel: &CancellationToken,
) -> Result<bool> {
    let opts = args.to_options(&ctx.config.scrape.sources_dir, ctx.config.ingest.await_completion);
    let result = ctx.scraper.scrape_source(name, &opts, cancel).await?;
    print_single_result(&result);
    Ok(result.is_success())
}

pub async fn scrape_all(
    ctx: &AppContext,
    args: &ScrapeArgs,
    cancel: &CancellationToken,
) -> Result<bool> {
    let opts = args.to_options(&ctx.config.scrape.sources_dir, ctx.config.ingest.await_completion);
    let results = ctx.scraper.scrape_all(&opts, cancel).await?;
    print!("{}", format_results_table(&results));

    let summary = RunSummary::from_results(&results);
    if !summary.succeeded() {
        eprintln!("{} of {} sources failed", summary.failed_sources, summary.sources);
    }
    Ok(summary.succeeded())
}

fn print_single_result(result: &ScrapeResult) {
    if let Some(e) = &result.error {
        eprintln!("Error: {}", e);
        return;
    }

    if result.dry_run {
        if result.events_found == 0 {
            println!("No events found");
            return;
        }
        let summary = serde_json::json!({
            "dry_run": true,
            "source": result.source_name,
            "url": result.source_url,
            "found": result.events_found,
            "submitted": result.events_submitted,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(out) => println!("{}", out),
            Err(e) => eprintln!("Error: {}", e),
        }
        return;
    }

    println!(
        "Source: {:<30}  Found: {}  New: {}  Duplicate: {}  Failed: {}",
        result.source_name,
        result.events_found,
        result.events_created,
        result.events_duplicate,
        result.events_failed
    );
    if result.pending {
        if let Some(batch_id) = &result.batch_id {
            println!("Batch {} still processing", batch_id);
        }
    }
}

fn result_status(result: &ScrapeResult) -> String {
    match &result.error {
        Some(e) => format!("error: {}", e),
        None if result.dry_run => "dry-run".to_string(),
        None if result.pending => "pending".to_string(),
        None => "ok".to_string(),
    }
}

/// Per-source table followed by a totals row.
fn format_results_table(results: &[ScrapeResult]) -> String {
    if results.is_empty() {
        return "No sources scraped.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<30} {:<6} {:<4} {:<4} {:<6}  {}",
        "SOURCE", "FOUND", "NEW", "DUP", "FAILED", "STATUS"
    );
    for r in results {
        let _ = writeln!(
            out,
            "{:<30} {:<6} {:<4} {:<4} {:<6}  {}",
            r.source_name,
            r.events_found,
            r.events_created,
            r.events_duplicate,
            r.events_failed,
            result_status(r)
        );
    }

    let summary = RunSummary::from_results(results);
    let _ = writeln!(out, "---");
    let _ = writeln!(
        out,
        "{:<30} {:<6} {:<4} {:<4} {:<6}",
        "TOTAL",
        summary.events_found,
        summary.events_created,
        summary.events_duplicate,
        summary.events_failed
    );
    out
}

pub fn list_sources(ctx: &AppContext, dir: Option<PathBuf>) -> Result<()> {
    let dir = sources_dir(ctx, dir);
    let sources = ctx.catalog.resolve(&dir)?;

    if sources.is_empty() {
        println!("No sources (database empty, nothing in {})", dir.display());
        return Ok(());
    }

    for source in sources {
        let state = if source.enabled { "" } else { " [disabled]" };
        println!(
            "{} (tier {}, trust {}){}\n  {}",
            source.display_name(),
            source.tier,
            source.trust_level,
            state,
            source.url
        );
        if !source.notes.is_empty() {
            println!("  note: {}", source.notes);
        }
    }

    Ok(())
}

pub fn sync_sources(ctx: &AppContext, dir: Option<PathBuf>) -> Result<()> {
    let dir = sources_dir(ctx, dir);
    let report = ctx.catalog.sync(&dir)?;

    for name in &report.created {
        println!("  + {}", name);
    }
    for name in &report.updated {
        println!("  ~ {}", name);
    }
    for msg in &report.skipped {
        eprintln!("  ! {}", msg);
    }

    println!(
        "\nSync complete: {} created, {} updated, {} skipped",
        report.created.len(),
        report.updated.len(),
        report.skipped.len()
    );
    Ok(())
}

pub fn export_sources(ctx: &AppContext, dir: Option<PathBuf>) -> Result<()> {
    let dir = sources_dir(ctx, dir);
    let report = ctx.catalog.export(&dir)?;

    for path in &report.written {
        println!("  > {}", path.display());
    }
    for msg in &report.skipped {
        eprintln!("  ! {}", msg);
    }

    println!(
        "\nExported {} sources to {}",
        report.written.len(),
        dir.display()
    );
    Ok(())
}

pub fn set_enabled(ctx: &AppContext, name: &str, enabled: bool, notes: Option<&str>) -> Result<()> {
    ctx.catalog.set_enabled(name, enabled, notes)?;
    if enabled {
        println!("Enabled source: {}", name);
    } else {
        println!("Disabled source: {}", name);
    }
    Ok(())
}

pub fn delete_source(ctx: &AppContext, name: &str) -> Result<()> {
    ctx.catalog.delete(name)?;
    println!("Deleted source: {}", name);
    Ok(())
}

/// Run tier 1 selectors against one page and print what they pick up.
pub async fn test_selectors(
    ctx: &AppContext,
    url: &str,
    source_file: Option<&Path>,
    flags: SelectorFlags,
    cancel: &CancellationToken,
) -> Result<()> {
    let selectors = match source_file {
        Some(path) => {
            let config = sources::load_file(path)?;
            if config.tier != Tier::Selector {
                return Err(TributaryError::InvalidSource(format!(
                    "{}: test-selectors needs a tier 1 source",
                    config.name
                )));
            }
            config.selectors
        }
        None => Some(SelectorSet::from(flags)),
    };

    let page_url = Url::parse(url)?;
    let mut source = SourceConfig::new("selector-test", page_url.as_str(), Tier::Selector);
    source.max_pages = 1;
    source.selectors = selectors;
    source.validate()?;

    let page = fetch_with_cancel(ctx.fetcher.as_ref(), &page_url, cancel).await?;
    let extractor = SelectorExtractor::new(ctx.fetcher.clone());
    let selectors = source.selectors.unwrap_or_default();
    let found = extractor.extract_page(&page, &selectors)?;

    println!(
        "Matched {} nodes, extracted {} events",
        found.node_count,
        found.events.len()
    );
    if let Some(next) = &found.next_url {
        println!("Next page: {}", next);
    }
    for event in &found.events {
        println!("{}", serde_json::to_string_pretty(event)?);
    }

    Ok(())
}

pub fn list_runs(ctx: &AppContext, source: Option<&str>, limit: usize) -> Result<()> {
    let store = ctx
        .store
        .as_ref()
        .ok_or_else(|| TributaryError::Config("no database configured".into()))?;
    let runs = store.recent_runs(source, limit)?;

    if runs.is_empty() {
        println!("No runs");
        return Ok(());
    }

    for run in runs {
        let started = run.started_at.format("%Y-%m-%d %H:%M:%S");
        println!(
            "#{} {} {} {} found {} submitted {} new {} dup {} failed {}",
            run.id,
            started,
            run.source_name,
            run.status.as_str(),
            run.events_found,
            run.events_submitted,
            run.events_created,
            run.events_duplicate,
            run.events_failed
        );
        if let Some(msg) = run.error_message {
            println!("  {}", msg);
        }
    }

    Ok(())
}
