use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{Result, TributaryError};
use crate::domain::{RunOutcome, RunStatus, ScraperRun, SourceRecord, SourceUpsert};
use crate::store::Store;

/// Fixed-width so lexical order matches chronological order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

const SOURCE_COLUMNS: &str = "id, name, url, tier, schedule, trust_level, license, enabled,
     max_pages, selectors, notes, last_scraped_at, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| TributaryError::Other(format!("migration failed: {}", e)))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            TributaryError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn format_datetime(dt: DateTime<Utc>) -> String {
        dt.format(TIMESTAMP_FORMAT).to_string()
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
        let raw: String = row.get(idx)?;
        Self::parse_datetime(&raw).ok_or_else(|| bad_timestamp(idx, &raw))
    }

    fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
        row.get::<_, Option<String>>(idx)?
            .map(|raw| Self::parse_datetime(&raw).ok_or_else(|| bad_timestamp(idx, &raw)))
            .transpose()
    }

    fn source_from_row(row: &Row<'_>) -> rusqlite::Result<SourceRecord> {
        Ok(SourceRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            url: row.get(2)?,
            tier: row.get(3)?,
            schedule: row.get(4)?,
            trust_level: row.get(5)?,
            license: row.get(6)?,
            enabled: row.get(7)?,
            max_pages: row.get(8)?,
            selectors: row.get(9)?,
            notes: row.get(10)?,
            last_scraped_at: Self::optional_timestamp(row, 11)?,
            created_at: Self::timestamp(row, 12)?,
            updated_at: Self::timestamp(row, 13)?,
        })
    }

    fn run_from_row(row: &Row<'_>) -> rusqlite::Result<ScraperRun> {
        Ok(ScraperRun {
            id: row.get(0)?,
            source_name: row.get(1)?,
            started_at: Self::timestamp(row, 2)?,
            finished_at: Self::optional_timestamp(row, 3)?,
            status: RunStatus::parse(&row.get::<_, String>(4)?),
            events_found: row.get::<_, i64>(5)? as usize,
            events_submitted: row.get::<_, i64>(6)? as usize,
            events_created: row.get::<_, i64>(7)? as usize,
            events_duplicate: row.get::<_, i64>(8)? as usize,
            events_failed: row.get::<_, i64>(9)? as usize,
            error_message: row.get(10)?,
        })
    }
}

impl Store for SqliteStore {
    fn list_sources(&self) -> Result<Vec<SourceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scraper_sources ORDER BY name",
            SOURCE_COLUMNS
        ))?;

        let sources = stmt
            .query_map([], Self::source_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(sources)
    }

    fn get_source_by_name(&self, name: &str) -> Result<Option<SourceRecord>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                &format!("SELECT {} FROM scraper_sources WHERE name = ?1", SOURCE_COLUMNS),
                params![name],
                Self::source_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn upsert_source(&self, source: &SourceUpsert) -> Result<SourceRecord> {
        let conn = self.conn()?;
        let now = Self::format_datetime(Utc::now());

        // created_at survives the update, so the caller can tell an insert
        // from an update by comparing the two timestamps.
        let record = conn.query_row(
            &format!(
                "INSERT INTO scraper_sources
                    (name, url, tier, schedule, trust_level, license, enabled,
                     max_pages, selectors, notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                 ON CONFLICT(name) DO UPDATE SET
                    url = excluded.url,
                    tier = excluded.tier,
                    schedule = excluded.schedule,
                    trust_level = excluded.trust_level,
                    license = excluded.license,
                    enabled = excluded.enabled,
                    max_pages = excluded.max_pages,
                    selectors = excluded.selectors,
                    notes = excluded.notes,
                    updated_at = excluded.updated_at
                 RETURNING {}",
                SOURCE_COLUMNS
            ),
            params![
                source.name,
                source.url,
                source.tier,
                source.schedule,
                source.trust_level,
                source.license,
                source.enabled,
                source.max_pages,
                source.selectors,
                source.notes,
                now,
            ],
            Self::source_from_row,
        )?;

        Ok(record)
    }

    fn set_source_enabled(&self, name: &str, enabled: bool, notes: Option<&str>) -> Result<bool> {
        let conn = self.conn()?;
        let now = Self::format_datetime(Utc::now());

        let changed = match notes {
            Some(notes) => conn.execute(
                "UPDATE scraper_sources SET enabled = ?1, notes = ?2, updated_at = ?3
                 WHERE name = ?4",
                params![enabled, notes, now, name],
            )?,
            None => conn.execute(
                "UPDATE scraper_sources SET enabled = ?1, updated_at = ?2 WHERE name = ?3",
                params![enabled, now, name],
            )?,
        };

        Ok(changed > 0)
    }

    fn delete_source(&self, name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM scraper_sources WHERE name = ?1",
            params![name],
        )?;
        Ok(deleted > 0)
    }

    fn mark_source_scraped(&self, name: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE scraper_sources SET last_scraped_at = ?1 WHERE name = ?2",
            params![Self::format_datetime(at), name],
        )?;
        Ok(())
    }

    fn insert_run(&self, source_name: &str, started_at: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO scraper_runs (source_name, started_at, status) VALUES (?1, ?2, ?3)",
            params![
                source_name,
                Self::format_datetime(started_at),
                RunStatus::Running.as_str()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_run(&self, id: i64, outcome: &RunOutcome, finished_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE scraper_runs SET
                finished_at = ?1, status = ?2, events_found = ?3, events_submitted = ?4,
                events_created = ?5, events_duplicate = ?6, events_failed = ?7,
                error_message = ?8
             WHERE id = ?9",
            params![
                Self::format_datetime(finished_at),
                outcome.status().as_str(),
                outcome.events_found as i64,
                outcome.events_submitted as i64,
                outcome.events_created as i64,
                outcome.events_duplicate as i64,
                outcome.events_failed as i64,
                outcome.error_message,
                id,
            ],
        )?;
        Ok(())
    }

    fn recent_runs(&self, source_name: Option<&str>, limit: usize) -> Result<Vec<ScraperRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, source_name, started_at, finished_at, status, events_found,
                    events_submitted, events_created, events_duplicate, events_failed,
                    error_message
             FROM scraper_runs
             WHERE ?1 IS NULL OR source_name = ?1 COLLATE NOCASE
             ORDER BY started_at DESC, id DESC
             LIMIT ?2",
        )?;

        let runs = stmt
            .query_map(params![source_name, limit as i64], Self::run_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(runs)
    }
}

fn bad_timestamp(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("invalid timestamp {:?}", raw).into(),
    )
}
