use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    FromRow, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::debug;

use crate::{ItemId, NewQueueItem, QueueItem, r#trait::Store};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS alerts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         TEXT    NOT NULL,
    toemail         TEXT    NOT NULL,
    subject         TEXT    NOT NULL,
    content         TEXT    NOT NULL,
    in_process      INTEGER NOT NULL DEFAULT 0,
    process_started INTEGER,
    tries           INTEGER NOT NULL DEFAULT 0,
    updated         INTEGER
);

CREATE INDEX IF NOT EXISTS idx_alerts_pending ON alerts (in_process, id);

CREATE TABLE IF NOT EXISTS log (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    registered INTEGER NOT NULL,
    log_type   TEXT    NOT NULL,
    log        TEXT    NOT NULL,
    log_meta   TEXT    NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS user_alerts (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       TEXT    NOT NULL,
    alert_type    TEXT    NOT NULL,
    alert_message TEXT    NOT NULL,
    alert_date    INTEGER NOT NULL
);
";

#[derive(Debug, FromRow)]
struct AlertRow {
    id: i64,
    user_id: String,
    toemail: String,
    subject: String,
    content: String,
    in_process: bool,
    process_started: Option<i64>,
    tries: i64,
}

impl From<AlertRow> for QueueItem {
    fn from(row: AlertRow) -> Self {
        // A claim without a start time can only come from a foreign writer;
        // dating it to the epoch lets the stale sweep release it.
        let claimed_at = row.in_process.then(|| {
            row.process_started
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .unwrap_or(DateTime::UNIX_EPOCH)
        });

        Self {
            id: ItemId::new(row.id),
            user_id: row.user_id,
            to: row.toemail,
            subject: row.subject,
            content: row.content,
            claimed_at,
            tries: u32::try_from(row.tries.max(0)).unwrap_or(u32::MAX),
        }
    }
}

/// Queue stored in the `alerts` table of a SQLite database
///
/// Claiming is a single `UPDATE ... RETURNING` statement. SQLite serializes
/// writers, so two workers sharing the database file can never claim the
/// same row.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and ensure the schema
    ///
    /// In-memory databases are pinned to a single, never-recycled connection
    /// so every query sees the same data.
    ///
    /// # Errors
    /// If the url is invalid, the database cannot be opened, or the schema
    /// cannot be created
    pub async fn connect(url: &str, max_connections: u32) -> crate::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect_with(options)
                .await?
        };

        let store = Self { pool };
        store.migrate().await?;

        debug!(url, "SQLite queue ready");
        Ok(store)
    }

    async fn migrate(&self) -> crate::Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool, shared with the audit sink
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Look up a single item
    ///
    /// # Errors
    /// If the query fails
    pub async fn get(&self, id: ItemId) -> crate::Result<Option<QueueItem>> {
        let row: Option<AlertRow> = sqlx::query_as(
            "SELECT id, user_id, toemail, subject, content, in_process, process_started, tries \
             FROM alerts WHERE id = ?1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(QueueItem::from))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn push(&self, item: NewQueueItem) -> crate::Result<ItemId> {
        let result = sqlx::query(
            "INSERT INTO alerts (user_id, toemail, subject, content) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&item.user_id)
        .bind(&item.to)
        .bind(&item.subject)
        .bind(&item.content)
        .execute(&self.pool)
        .await?;

        Ok(ItemId::new(result.last_insert_rowid()))
    }

    async fn reclaim_stale(&self, window: Duration) -> crate::Result<u64> {
        let cutoff = super::stale_cutoff(Utc::now(), window)?;

        let result = sqlx::query(
            "UPDATE alerts SET in_process = 0, process_started = NULL \
             WHERE in_process = 1 AND (process_started IS NULL OR process_started < ?1)",
        )
        .bind(cutoff.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn claim_next(&self, limit: usize) -> crate::Result<Vec<QueueItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<AlertRow> = sqlx::query_as(
            "UPDATE alerts SET in_process = 1, process_started = ?1 \
             WHERE id IN (SELECT id FROM alerts WHERE in_process = 0 ORDER BY id ASC LIMIT ?2) \
             RETURNING id, user_id, toemail, subject, content, in_process, process_started, tries",
        )
        .bind(Utc::now().timestamp())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        // RETURNING makes no ordering promise
        let mut items: Vec<QueueItem> = rows.into_iter().map(QueueItem::from).collect();
        items.sort_by_key(|item| item.id);

        Ok(items)
    }

    async fn delete(&self, id: ItemId) -> crate::Result<()> {
        sqlx::query("DELETE FROM alerts WHERE id = ?1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn increment_retry(&self, id: ItemId) -> crate::Result<()> {
        sqlx::query(
            "UPDATE alerts SET in_process = 0, process_started = NULL, tries = tries + 1, \
             updated = ?2 WHERE id = ?1",
        )
        .bind(id.get())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
