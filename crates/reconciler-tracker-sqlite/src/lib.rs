//! Durable SQLite-backed `Tracker`
//!
//! Uses runtime `sqlx::query`/`query_as` rather than the compile-time
//! `sqlx::query!` macros: this tracker ships as a standalone crate with no
//! fixture database checked in for macro verification, so every query is
//! built and bound at call time and its shape is exercised by this
//! crate's own tests against a real in-memory SQLite database.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reconciler_core::error::{Error, Result};
use reconciler_core::record::{RecordKey, RecordType};
use reconciler_core::spec::SourceKind;
use reconciler_core::tracked::{PreservationList, TrackedEntry};
use reconciler_core::tracker::Tracker;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::debug;

pub struct SqliteTracker {
    pool: SqlitePool,
}

impl SqliteTracker {
    /// Opens (creating if missing) the SQLite database at `path` and runs
    /// the schema migration. WAL mode matches the corpus's pattern for a
    /// single-writer, many-reader local database.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(|e| Error::state_store(format!("invalid sqlite path {path}: {e}")))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::state_store(format!("failed to open sqlite tracker db: {e}")))?;

        let tracker = Self { pool };
        tracker.migrate().await?;
        Ok(tracker)
    }

    /// In-memory database, for tests and for running without persistence
    /// across a process restart while still exercising this crate's SQL.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::state_store(format!("failed to open in-memory sqlite tracker db: {e}")))?;
        let tracker = Self { pool };
        tracker.migrate().await?;
        Ok(tracker)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_records (
                provider        TEXT NOT NULL,
                zone            TEXT NOT NULL,
                record_type     TEXT NOT NULL,
                name            TEXT NOT NULL,
                discriminator   TEXT NOT NULL,
                source          TEXT NOT NULL,
                first_seen      TEXT NOT NULL,
                last_confirmed  TEXT NOT NULL,
                orphaned_since  TEXT,
                PRIMARY KEY (provider, zone, record_type, name, discriminator)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(sqlite_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS preserved_patterns (
                pattern TEXT NOT NULL PRIMARY KEY
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(sqlite_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orphan_deletion_history (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                provider        TEXT NOT NULL,
                zone            TEXT NOT NULL,
                record_type     TEXT NOT NULL,
                name            TEXT NOT NULL,
                discriminator   TEXT NOT NULL,
                source          TEXT NOT NULL,
                first_seen      TEXT NOT NULL,
                reason          TEXT NOT NULL,
                deleted_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(sqlite_error)?;

        Ok(())
    }
}

fn sqlite_error(e: sqlx::Error) -> Error {
    Error::state_store(format!("sqlite tracker error: {e}"))
}

fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn from_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::state_store(format!("invalid timestamp in tracker db: {e}")))
}

fn source_to_str(source: SourceKind) -> &'static str {
    match source {
        SourceKind::Container => "container",
        SourceKind::Router => "router",
        SourceKind::Manual => "manual",
    }
}

fn source_from_str(s: &str) -> Result<SourceKind> {
    match s {
        "container" => Ok(SourceKind::Container),
        "router" => Ok(SourceKind::Router),
        "manual" => Ok(SourceKind::Manual),
        other => Err(Error::state_store(format!("unknown source kind in tracker db: {other}"))),
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<TrackedEntry> {
    let record_type: String = row.try_get("record_type").map_err(sqlite_error)?;
    let orphaned_since: Option<String> = row.try_get("orphaned_since").map_err(sqlite_error)?;
    let first_seen: String = row.try_get("first_seen").map_err(sqlite_error)?;
    let last_confirmed: String = row.try_get("last_confirmed").map_err(sqlite_error)?;
    let source: String = row.try_get("source").map_err(sqlite_error)?;

    Ok(TrackedEntry {
        key: RecordKey {
            provider: row.try_get("provider").map_err(sqlite_error)?,
            zone: row.try_get("zone").map_err(sqlite_error)?,
            record_type: RecordType::from_str(&record_type).map_err(|e| Error::state_store(e.to_string()))?,
            name: row.try_get("name").map_err(sqlite_error)?,
            discriminator: row.try_get("discriminator").map_err(sqlite_error)?,
        },
        first_seen: from_rfc3339(&first_seen)?,
        last_confirmed: from_rfc3339(&last_confirmed)?,
        orphaned_since: orphaned_since.map(|s| from_rfc3339(&s)).transpose()?,
        source: source_from_str(&source)?,
    })
}

#[async_trait]
impl Tracker for SqliteTracker {
    async fn track(&self, key: &RecordKey, source: SourceKind, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tracked_records
                (provider, zone, record_type, name, discriminator, source, first_seen, last_confirmed, orphaned_since)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)
            ON CONFLICT (provider, zone, record_type, name, discriminator) DO NOTHING
            "#,
        )
        .bind(&key.provider)
        .bind(&key.zone)
        .bind(key.record_type.to_string())
        .bind(&key.name)
        .bind(&key.discriminator)
        .bind(source_to_str(source))
        .bind(to_rfc3339(now))
        .bind(to_rfc3339(now))
        .execute(&self.pool)
        .await
        .map_err(sqlite_error)?;
        Ok(())
    }

    async fn untrack(&self, key: &RecordKey) -> Result<()> {
        sqlx::query(
            "DELETE FROM tracked_records WHERE provider = ? AND zone = ? AND record_type = ? AND name = ? AND discriminator = ?",
        )
        .bind(&key.provider)
        .bind(&key.zone)
        .bind(key.record_type.to_string())
        .bind(&key.name)
        .bind(&key.discriminator)
        .execute(&self.pool)
        .await
        .map_err(sqlite_error)?;
        Ok(())
    }

    async fn is_tracked(&self, key: &RecordKey) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<TrackedEntry>> {
        let row = sqlx::query(
            "SELECT * FROM tracked_records WHERE provider = ? AND zone = ? AND record_type = ? AND name = ? AND discriminator = ?",
        )
        .bind(&key.provider)
        .bind(&key.zone)
        .bind(key.record_type.to_string())
        .bind(&key.name)
        .bind(&key.discriminator)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlite_error)?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn confirm(&self, key: &RecordKey, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE tracked_records SET last_confirmed = ?, orphaned_since = NULL \
             WHERE provider = ? AND zone = ? AND record_type = ? AND name = ? AND discriminator = ?",
        )
        .bind(to_rfc3339(now))
        .bind(&key.provider)
        .bind(&key.zone)
        .bind(key.record_type.to_string())
        .bind(&key.name)
        .bind(&key.discriminator)
        .execute(&self.pool)
        .await
        .map_err(sqlite_error)?;
        Ok(())
    }

    async fn mark_orphan(&self, key: &RecordKey, since: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE tracked_records SET orphaned_since = ? \
             WHERE provider = ? AND zone = ? AND record_type = ? AND name = ? AND discriminator = ? AND orphaned_since IS NULL",
        )
        .bind(to_rfc3339(since))
        .bind(&key.provider)
        .bind(&key.zone)
        .bind(key.record_type.to_string())
        .bind(&key.name)
        .bind(&key.discriminator)
        .execute(&self.pool)
        .await
        .map_err(sqlite_error)?;
        Ok(())
    }

    async fn clear_orphan(&self, key: &RecordKey) -> Result<()> {
        sqlx::query(
            "UPDATE tracked_records SET orphaned_since = NULL \
             WHERE provider = ? AND zone = ? AND record_type = ? AND name = ? AND discriminator = ?",
        )
        .bind(&key.provider)
        .bind(&key.zone)
        .bind(key.record_type.to_string())
        .bind(&key.name)
        .bind(&key.discriminator)
        .execute(&self.pool)
        .await
        .map_err(sqlite_error)?;
        Ok(())
    }

    async fn list_tracked(&self) -> Result<Vec<TrackedEntry>> {
        let rows = sqlx::query("SELECT * FROM tracked_records")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlite_error)?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn preservation_list(&self) -> Result<PreservationList> {
        let rows = sqlx::query("SELECT pattern FROM preserved_patterns")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlite_error)?;
        let patterns = rows
            .into_iter()
            .map(|row| row.try_get::<String, _>("pattern").map_err(sqlite_error))
            .collect::<Result<Vec<_>>>()?;
        Ok(PreservationList::new(patterns))
    }

    async fn add_preserved(&self, pattern: &str) -> Result<()> {
        sqlx::query("INSERT INTO preserved_patterns (pattern) VALUES (?) ON CONFLICT (pattern) DO NOTHING")
            .bind(pattern.to_ascii_lowercase())
            .execute(&self.pool)
            .await
            .map_err(sqlite_error)?;
        Ok(())
    }

    async fn remove_preserved(&self, pattern: &str) -> Result<()> {
        sqlx::query("DELETE FROM preserved_patterns WHERE pattern = ?")
            .bind(pattern.to_ascii_lowercase())
            .execute(&self.pool)
            .await
            .map_err(sqlite_error)?;
        Ok(())
    }

    async fn record_orphan_deletion(
        &self,
        entry: &TrackedEntry,
        reason: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<()> {
        debug!(key = %entry.key, reason, "recording orphan deletion history");
        sqlx::query(
            r#"
            INSERT INTO orphan_deletion_history
                (provider, zone, record_type, name, discriminator, source, first_seen, reason, deleted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.key.provider)
        .bind(&entry.key.zone)
        .bind(entry.key.record_type.to_string())
        .bind(&entry.key.name)
        .bind(&entry.key.discriminator)
        .bind(source_to_str(entry.source))
        .bind(to_rfc3339(entry.first_seen))
        .bind(reason)
        .bind(to_rfc3339(deleted_at))
        .execute(&self.pool)
        .await
        .map_err(sqlite_error)?;
        Ok(())
    }
}
