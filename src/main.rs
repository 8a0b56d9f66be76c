use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tributary::app::AppContext;
use tributary::cli::{commands, Cli, Commands, ScrapeTarget, SourcesAction};
use tributary::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(workers) = cli.workers {
        config.scrape.workers = workers;
    }

    let ctx = AppContext::new(config)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping");
            trigger.cancel();
        }
    });

    let ok = match cli.command {
        Commands::Scrape { target } => match target {
            ScrapeTarget::Url { url, args } => {
                commands::scrape_url(&ctx, &url, &args, &cancel).await?
            }
            ScrapeTarget::Source { name, args } => {
                commands::scrape_source(&ctx, &name, &args, &cancel).await?
            }
            ScrapeTarget::All { args } => commands::scrape_all(&ctx, &args, &cancel).await?,
        },
        Commands::Sources { action } => {
            match action {
                SourcesAction::List { dir } => commands::list_sources(&ctx, dir)?,
                SourcesAction::Sync { dir } => commands::sync_sources(&ctx, dir)?,
                SourcesAction::Export { dir } => commands::export_sources(&ctx, dir)?,
                SourcesAction::Enable { name } => commands::set_enabled(&ctx, &name, true, None)?,
                SourcesAction::Disable { name, notes } => {
                    commands::set_enabled(&ctx, &name, false, notes.as_deref())?
                }
                SourcesAction::Delete { name } => commands::delete_source(&ctx, &name)?,
            }
            true
        }
        Commands::TestSelectors {
            url,
            source_file,
            selectors,
        } => {
            commands::test_selectors(&ctx, &url, source_file.as_deref(), selectors, &cancel)
                .await?;
            true
        }
        Commands::Runs { source, limit } => {
            commands::list_runs(&ctx, source.as_deref(), limit)?;
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
