use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::app::error::{Result, TributaryError};
use crate::config::Config;
use crate::fetcher::{Fetcher, HttpFetcher, PoliteFetcher};
use crate::ingest::{HttpIngestClient, Ingestor};
use crate::scraper::Scraper;
use crate::sources::SourceCatalog;
use crate::store::{NoopTracker, RunTracker, SqliteStore, Store, StoreTracker};

pub struct AppContext {
    pub config: Config,
    pub store: Option<Arc<SqliteStore>>,
    pub fetcher: Arc<dyn Fetcher>,
    pub catalog: SourceCatalog,
    pub scraper: Scraper,
}

impl AppContext {
    /// Wire everything from `config`. A store that fails to open is logged and
    /// the run continues without one.
    pub fn new(config: Config) -> Result<Self> {
        let store = if config.database.enabled {
            match Self::open_store(&config) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    tracing::warn!(error = %e, "database unavailable, continuing without run tracking");
                    None
                }
            }
        } else {
            None
        };

        Self::build(config, store)
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        Self::build(config, Some(store))
    }

    fn build(config: Config, store: Option<Arc<SqliteStore>>) -> Result<Self> {
        let user_agent = config.scrape.user_agent.as_str();
        let http: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(user_agent)?);
        let fetcher: Arc<dyn Fetcher> = Arc::new(
            PoliteFetcher::new(http, user_agent)
                .with_delay(Duration::from_millis(config.scrape.request_delay_ms))
                .respect_robots(config.scrape.respect_robots),
        );

        let ingestor: Arc<dyn Ingestor> = Arc::new(
            HttpIngestClient::new(&config.ingest.api_base, &config.ingest.api_key, user_agent)?
                .with_polling(
                    Duration::from_secs(config.ingest.poll_interval_secs.max(1)),
                    Duration::from_secs(config.ingest.poll_timeout_secs),
                ),
        );

        let shared: Option<Arc<dyn Store>> = store.clone().map(|s| s as Arc<dyn Store>);
        let tracker: Arc<dyn RunTracker> = match &shared {
            Some(store) => Arc::new(StoreTracker::new(store.clone())),
            None => Arc::new(NoopTracker),
        };

        let catalog = SourceCatalog::new(shared);
        let scraper = Scraper::new(fetcher.clone(), ingestor, tracker, catalog.clone())
            .with_workers(config.scrape.workers);

        Ok(Self {
            config,
            store,
            fetcher,
            catalog,
            scraper,
        })
    }

    fn open_store(config: &Config) -> Result<SqliteStore> {
        let db_path = match &config.database.path {
            Some(p) => p.clone(),
            None => Self::default_db_path()?,
        };
        SqliteStore::new(&db_path)
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| TributaryError::Config("Could not find data directory".into()))?;
        let tributary_dir = data_dir.join("tributary");
        std::fs::create_dir_all(&tributary_dir)?;
        Ok(tributary_dir.join("tributary.db"))
    }
}
