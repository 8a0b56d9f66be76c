//! Configuration management for tributary.
//!
//! Configuration is read from `~/.config/tributary/config.toml` (or the
//! `--config` path) at startup. If the default file doesn't exist, one with
//! comments is created. `TRIBUTARY_API_KEY` overrides `ingest.api_key`.

use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::fetcher::http_fetcher::DEFAULT_USER_AGENT;
use crate::scraper::DEFAULT_WORKERS;
use crate::sources::DEFAULT_SOURCES_DIR;

pub const API_KEY_ENV: &str = "TRIBUTARY_API_KEY";

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ingest: IngestConfig,
    pub scrape: ScrapeConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Base URL of the ingestion API, e.g. `https://events.example.org/api/v1`
    pub api_base: String,
    pub api_key: String,
    pub await_completion: bool,
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8080/api/v1".to_string(),
            api_key: String::new(),
            await_completion: true,
            poll_interval_secs: 2,
            poll_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub sources_dir: PathBuf,
    pub workers: usize,
    pub user_agent: String,
    /// Minimum gap between requests to one host. 0 disables pacing.
    pub request_delay_ms: u64,
    pub respect_robots: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            sources_dir: PathBuf::from(DEFAULT_SOURCES_DIR),
            workers: DEFAULT_WORKERS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_delay_ms: 1000,
            respect_robots: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub enabled: bool,
    /// Defaults to `<data dir>/tributary/tributary.db`
    pub path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl Config {
    /// Load configuration from the default path, creating a commented
    /// default file when there is none.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default().with_env_overrides());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(self) -> Self {
        self.with_api_key_override(std::env::var(API_KEY_ENV).ok())
    }

    fn with_api_key_override(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.ingest.api_key = key;
        }
        self
    }

    /// Get the default config file path: `~/.config/tributary/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("tributary").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> String {
        r##"# tributary configuration

[ingest]
# Base URL of the batch ingestion API
api_base = "http://localhost:8080/api/v1"

# Bearer key for the ingestion API. TRIBUTARY_API_KEY overrides this.
api_key = ""

# Wait for each submitted batch to finish before reporting
await_completion = true

# Batch status polling
poll_interval_secs = 2
poll_timeout_secs = 30

[scrape]
# Source config files, used when the database has no sources
sources_dir = "configs/sources"

# Sources scraped concurrently
workers = 3

# Milliseconds between requests to the same host (0 disables)
request_delay_ms = 1000

# Skip pages that robots.txt disallows
respect_robots = true

[database]
# Set to false to run without a database (no run history, files only)
enabled = true

# path = "/var/lib/tributary/tributary.db"
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert_eq!(config.ingest.poll_interval_secs, 2);
        assert_eq!(config.scrape.workers, 3);
        assert_eq!(config.scrape.request_delay_ms, 1000);
        assert!(config.scrape.respect_robots);
        assert!(config.database.enabled);
        assert!(config.database.path.is_none());
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[ingest]
api_base = "https://events.example.org/api/v1"

[database]
enabled = false
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.ingest.api_base, "https://events.example.org/api/v1");
        assert!(config.ingest.await_completion);
        assert_eq!(config.scrape.sources_dir, PathBuf::from("configs/sources"));
        assert!(!config.database.enabled);
    }

    #[test]
    fn test_politeness_settings() {
        let config: Config =
            toml::from_str("[scrape]\nrequest_delay_ms = 0\nrespect_robots = false\n").unwrap();
        assert_eq!(config.scrape.request_delay_ms, 0);
        assert!(!config.scrape.respect_robots);
        assert_eq!(config.scrape.workers, 3);
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").expect("Empty config should work");
        assert_eq!(config.ingest.poll_timeout_secs, 30);
        assert!(config.scrape.user_agent.starts_with("tributary/"));
    }

    #[test]
    fn test_api_key_override() {
        let config = Config::default().with_api_key_override(Some("from-env".into()));
        assert_eq!(config.ingest.api_key, "from-env");

        let config = Config::default().with_api_key_override(Some("  ".into()));
        assert!(config.ingest.api_key.is_empty());
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scrape]\nworkers = \"many\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let missing = Config::load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
