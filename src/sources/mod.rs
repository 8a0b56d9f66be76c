//! Source configs: TOML files on disk and rows in the store.
//!
//! The store is authoritative at runtime; the files are an import/export
//! format reconciled explicitly with [`SourceCatalog::sync`] and
//! [`SourceCatalog::export`].

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app::{Result, TributaryError};
use crate::domain::{SourceConfig, SourceUpsert};
use crate::store::Store;

pub const DEFAULT_SOURCES_DIR: &str = "configs/sources";

/// Configs read from a directory plus a warning per skipped file.
#[derive(Debug, Default)]
pub struct LoadedSources {
    pub sources: Vec<SourceConfig>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<String>,
}

/// Parse and validate one source file.
pub fn load_file(path: &Path) -> Result<SourceConfig> {
    let content = fs::read_to_string(path)?;
    let mut config: SourceConfig = toml::from_str(&content)?;
    config.apply_defaults();
    config.validate()?;
    Ok(config)
}

/// Load every `*.toml` file in `dir`, sorted by source name. A missing
/// directory is empty; files starting with `_` are ignored.
pub fn load_dir(dir: &Path) -> Result<LoadedSources> {
    let mut loaded = LoadedSources::default();
    if !dir.exists() {
        tracing::debug!(dir = %dir.display(), "sources directory does not exist");
        return Ok(loaded);
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.starts_with('_') && !n.starts_with('.'))
        })
        .collect();
    paths.sort();

    let mut seen = HashSet::new();
    for path in paths {
        match load_file(&path) {
            Ok(config) => {
                if !seen.insert(config.name.to_lowercase()) {
                    let msg = format!(
                        "{}: duplicate source name {:?}, skipped",
                        path.display(),
                        config.name
                    );
                    tracing::warn!("{}", msg);
                    loaded.skipped.push(msg);
                    continue;
                }
                loaded.sources.push(config);
            }
            Err(e) => {
                let msg = format!("{}: {}", path.display(), e);
                tracing::warn!("skipping source file {}", msg);
                loaded.skipped.push(msg);
            }
        }
    }

    loaded.sources.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(loaded)
}

/// Write `config` to `<dir>/<name>.toml`, replacing any existing file.
pub fn write_file(dir: &Path, config: &SourceConfig) -> Result<PathBuf> {
    if !is_safe_file_name(&config.name) {
        return Err(TributaryError::InvalidSource(format!(
            "{:?} cannot be used as a file name",
            config.name
        )));
    }

    let path = dir.join(format!("{}.toml", config.name));
    let content = toml::to_string_pretty(config)?;
    fs::write(&path, content)?;
    Ok(path)
}

fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}

/// Resolves, syncs and exports source configs.
#[derive(Clone)]
pub struct SourceCatalog {
    store: Option<Arc<dyn Store>>,
}

impl SourceCatalog {
    pub fn new(store: Option<Arc<dyn Store>>) -> Self {
        Self { store }
    }

    /// Every source, enabled or not. Reads the store first and falls back to
    /// `dir` when the store is unavailable or yields no usable source.
    pub fn resolve(&self, dir: &Path) -> Result<Vec<SourceConfig>> {
        if let Some(store) = &self.store {
            match store.list_sources() {
                Ok(records) if !records.is_empty() => {
                    let mut sources = Vec::with_capacity(records.len());
                    for record in records {
                        match record.to_config() {
                            Ok(config) => sources.push(config),
                            Err(e) => {
                                tracing::warn!(source = %record.name, error = %e, "skipping stored source")
                            }
                        }
                    }
                    if !sources.is_empty() {
                        return Ok(sources);
                    }
                    tracing::warn!("no stored source could be decoded, falling back to files");
                }
                Ok(_) => {
                    tracing::debug!("no sources in database, reading files");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "database source list failed, falling back to files");
                }
            }
        }

        Ok(load_dir(dir)?.sources)
    }

    /// Look up one source by name, ignoring case.
    pub fn find(&self, name: &str, dir: &Path) -> Result<SourceConfig> {
        self.resolve(dir)?
            .into_iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| TributaryError::SourceNotFound(name.to_string()))
    }

    fn require_store(&self) -> Result<&Arc<dyn Store>> {
        self.store
            .as_ref()
            .ok_or_else(|| TributaryError::Config("no database configured".into()))
    }

    /// Upsert every file in `dir` into the store.
    pub fn sync(&self, dir: &Path) -> Result<SyncReport> {
        let store = self.require_store()?;
        let loaded = load_dir(dir)?;

        let mut report = SyncReport {
            skipped: loaded.skipped,
            ..Default::default()
        };

        for config in loaded.sources {
            let upsert = match SourceUpsert::from_config(&config) {
                Ok(upsert) => upsert,
                Err(e) => {
                    let msg = format!("{}: {}", config.name, e);
                    tracing::warn!("skipping source {}", msg);
                    report.skipped.push(msg);
                    continue;
                }
            };

            let record = store.upsert_source(&upsert)?;
            if record.was_created() {
                tracing::info!(source = %record.name, "created source");
                report.created.push(record.name);
            } else {
                tracing::info!(source = %record.name, "updated source");
                report.updated.push(record.name);
            }
        }

        Ok(report)
    }

    /// Write every stored source to `dir`, overwriting existing files.
    pub fn export(&self, dir: &Path) -> Result<ExportReport> {
        let store = self.require_store()?;
        let records = store.list_sources()?;
        fs::create_dir_all(dir)?;

        let mut report = ExportReport::default();
        for record in records {
            let written = record
                .to_config()
                .and_then(|config| write_file(dir, &config));
            match written {
                Ok(path) => report.written.push(path),
                Err(e) => {
                    let msg = format!("{}: {}", record.name, e);
                    tracing::warn!("skipping export of {}", msg);
                    report.skipped.push(msg);
                }
            }
        }

        Ok(report)
    }

    /// Remove a source from the store. Its run history is kept.
    pub fn delete(&self, name: &str) -> Result<()> {
        let store = self.require_store()?;
        if store.delete_source(name)? {
            tracing::info!(source = %name, "deleted source");
            Ok(())
        } else {
            Err(TributaryError::SourceNotFound(name.to_string()))
        }
    }

    pub fn set_enabled(&self, name: &str, enabled: bool, notes: Option<&str>) -> Result<()> {
        let store = self.require_store()?;
        if store.set_source_enabled(name, enabled, notes)? {
            Ok(())
        } else {
            Err(TributaryError::SourceNotFound(name.to_string()))
        }
    }
}
