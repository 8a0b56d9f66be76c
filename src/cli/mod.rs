pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::SelectorSet;
use crate::scraper::ScrapeOptions;

#[derive(Parser)]
#[command(name = "tributary")]
#[command(about = "Scrape event listings and submit them for ingestion", long_about = None)]
pub struct Cli {
    /// Path to the config file (default: ~/.config/tributary/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of sources scraped concurrently
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scrape events from a URL, a named source, or every enabled source
    Scrape {
        #[command(subcommand)]
        target: ScrapeTarget,
    },
    /// Manage source configs
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },
    /// Try tier 1 selectors against one page without submitting anything
    TestSelectors {
        /// Page to fetch
        url: String,

        /// Read selectors from a source file
        #[arg(long, conflicts_with = "event_list")]
        source_file: Option<PathBuf>,

        #[command(flatten)]
        selectors: SelectorFlags,
    },
    /// Show recent scrape runs
    Runs {
        /// Only runs for this source
        #[arg(long)]
        source: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum ScrapeTarget {
    /// Scrape one ad hoc URL for structured event data
    Url {
        url: String,
        #[command(flatten)]
        args: ScrapeArgs,
    },
    /// Scrape one configured source
    Source {
        name: String,
        #[command(flatten)]
        args: ScrapeArgs,
    },
    /// Scrape every enabled source
    All {
        #[command(flatten)]
        args: ScrapeArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ScrapeArgs {
    /// Extract and count events without submitting them
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum events submitted per source (0 = no limit)
    #[arg(long, default_value_t = 0)]
    pub limit: usize,

    /// Directory of source files used when the database has none
    #[arg(long)]
    pub sources: Option<PathBuf>,

    /// Don't wait for submitted batches to finish
    #[arg(long)]
    pub no_wait: bool,
}

impl ScrapeArgs {
    pub fn to_options(&self, default_dir: &std::path::Path, await_default: bool) -> ScrapeOptions {
        ScrapeOptions {
            dry_run: self.dry_run,
            limit: self.limit,
            sources_dir: self
                .sources
                .clone()
                .unwrap_or_else(|| default_dir.to_path_buf()),
            await_completion: await_default && !self.no_wait,
        }
    }
}

#[derive(Subcommand)]
pub enum SourcesAction {
    /// List every source (database first, then files)
    List {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Upsert source files into the database
    Sync {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Write database sources out as files
    Export {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Enable a source
    Enable { name: String },
    /// Disable a source, optionally recording why
    Disable {
        name: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a source from the database
    Delete { name: String },
}

#[derive(Args, Debug, Clone, Default)]
pub struct SelectorFlags {
    /// Event container selector
    #[arg(long, required_unless_present = "source_file")]
    pub event_list: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub start_date: Option<String>,
    #[arg(long)]
    pub end_date: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Detail link selector
    #[arg(long)]
    pub event_url: Option<String>,
    #[arg(long)]
    pub image: Option<String>,
}

impl From<SelectorFlags> for SelectorSet {
    fn from(flags: SelectorFlags) -> Self {
        SelectorSet {
            event_list: flags.event_list,
            name: flags.name,
            start_date: flags.start_date,
            end_date: flags.end_date,
            location: flags.location,
            description: flags.description,
            url: flags.event_url,
            image: flags.image,
            pagination: None,
        }
    }
}
