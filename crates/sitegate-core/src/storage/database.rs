//! SQLite-backed persistence.
//!
//! Two tables: the registered site collection and per-day usage records
//! keyed `(date_key, site_id)`. The connection sits behind a mutex so the
//! database can be shared across the async components as a trait object.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{StoreError, ValidationError};
use crate::types::{normalize_pattern, DailyUsage, TrackedSite};

use super::{data_dir, SiteStore, UsageStore};

/// SQLite database holding site configuration and daily usage.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/sitegate/sitegate.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let path = data_dir()
            .map_err(|err| StoreError::QueryFailed(format!("data dir unavailable: {err}")))?
            .join("sitegate.db");
        Self::open_at(&path)
    }

    /// Open (or create) the database at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and throwaway runs).
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::QueryFailed("connection mutex poisoned".into()))
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sites (
                id                  TEXT PRIMARY KEY,
                url_pattern         TEXT NOT NULL,
                daily_limit_seconds INTEGER NOT NULL DEFAULT 0,
                daily_open_limit    INTEGER NOT NULL DEFAULT 0,
                enabled             INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS daily_usage (
                date_key           TEXT NOT NULL,
                site_id            TEXT NOT NULL,
                time_spent_seconds INTEGER NOT NULL DEFAULT 0,
                opens              INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (date_key, site_id)
            );

            CREATE INDEX IF NOT EXISTS idx_daily_usage_date ON daily_usage(date_key);",
        )?;
        Ok(())
    }

    /// Register a new site.
    ///
    /// The pattern is normalized (trimmed, lowercased) and must be
    /// non-empty afterwards.
    ///
    /// # Errors
    /// Returns a validation error for an empty pattern, or a store error
    /// if the insert fails.
    pub fn add_site(
        &self,
        pattern: &str,
        daily_limit_seconds: u64,
        daily_open_limit: u64,
    ) -> Result<TrackedSite, crate::error::CoreError> {
        let url_pattern = normalize_pattern(pattern);
        if url_pattern.is_empty() {
            return Err(ValidationError::EmptyPattern.into());
        }
        let site = TrackedSite {
            id: Uuid::new_v4().to_string(),
            url_pattern,
            daily_limit_seconds,
            daily_open_limit,
            enabled: true,
        };
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sites (id, url_pattern, daily_limit_seconds, daily_open_limit, enabled)
             VALUES (?1, ?2, ?3, ?4, 1)",
            params![
                site.id,
                site.url_pattern,
                site.daily_limit_seconds,
                site.daily_open_limit,
            ],
        )
        .map_err(StoreError::from)?;
        Ok(site)
    }

    /// Remove a site. Returns whether a row was deleted.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub fn remove_site(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM sites WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    /// Enable or disable a site. Returns whether a row was updated.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE sites SET enabled = ?2 WHERE id = ?1",
            params![id, enabled as i64],
        )?;
        Ok(n > 0)
    }

    /// Look up a single site by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn site_by_id(&self, id: &str) -> Result<Option<TrackedSite>, StoreError> {
        let conn = self.lock()?;
        let site = conn
            .query_row(
                "SELECT id, url_pattern, daily_limit_seconds, daily_open_limit, enabled
                 FROM sites WHERE id = ?1",
                params![id],
                row_to_site,
            )
            .optional()?;
        Ok(site)
    }
}

fn row_to_site(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackedSite> {
    Ok(TrackedSite {
        id: row.get(0)?,
        url_pattern: row.get(1)?,
        daily_limit_seconds: row.get::<_, i64>(2)?.max(0) as u64,
        daily_open_limit: row.get::<_, i64>(3)?.max(0) as u64,
        enabled: row.get::<_, i64>(4)? != 0,
    })
}

impl SiteStore for Database {
    fn distracting_sites(&self) -> Result<Vec<TrackedSite>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, url_pattern, daily_limit_seconds, daily_open_limit, enabled
             FROM sites ORDER BY rowid",
        )?;
        let sites = stmt
            .query_map([], row_to_site)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }
}

impl UsageStore for Database {
    fn usage_stats(&self, date_key: &str) -> Result<HashMap<String, DailyUsage>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT site_id, time_spent_seconds, opens FROM daily_usage WHERE date_key = ?1",
        )?;
        let rows = stmt.query_map(params![date_key], |row| {
            Ok((
                row.get::<_, String>(0)?,
                DailyUsage {
                    time_spent_seconds: row.get::<_, i64>(1)?.max(0) as u64,
                    opens: row.get::<_, i64>(2)?.max(0) as u64,
                },
            ))
        })?;
        let mut out = HashMap::new();
        for row in rows {
            let (site_id, record) = row?;
            out.insert(site_id, record);
        }
        Ok(out)
    }

    fn update_usage_stats(
        &self,
        date_key: &str,
        site_id: &str,
        record: DailyUsage,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO daily_usage (date_key, site_id, time_spent_seconds, opens)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (date_key, site_id) DO UPDATE SET
                 time_spent_seconds = excluded.time_spent_seconds,
                 opens = excluded.opens",
            params![date_key, site_id, record.time_spent_seconds, record.opens],
        )?;
        Ok(())
    }
}
