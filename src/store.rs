//! Log entry persistence.
//!
//! The [`LogStore`] trait is the seam between the tailer (sole writer), the
//! query service (readers), and the backing database. Entries are
//! append-only: there is no update or delete operation.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`append`](LogStore::append) | Persist one entry, returning its id |
//! | [`query`](LogStore::query) | Fetch entries matching a [`Predicate`] |

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{LogEntry, StoredLogEntry};
use crate::query::{Predicate, SqlParam};

/// Abstract storage backend for parsed log entries.
///
/// Implementations must be `Send + Sync`: one instance is shared between
/// the tailer task and every request handler.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Persist one entry. Each call commits independently, so a failure
    /// leaves previously appended entries intact.
    async fn append(&self, entry: &LogEntry) -> Result<i64>;

    /// Return all entries matching `predicate`. Rows come back in no
    /// particular order unless the predicate carries an `ORDER BY`.
    async fn query(&self, predicate: &Predicate) -> Result<Vec<StoredLogEntry>>;
}

/// SQLite implementation of [`LogStore`] over the `logs` table.
pub struct SqliteLogStore {
    pool: SqlitePool,
}

impl SqliteLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<StoredLogEntry> {
    let ts: i64 = row.try_get("timestamp")?;
    let timestamp = DateTime::from_timestamp(ts, 0)
        .with_context(|| format!("stored timestamp out of range: {}", ts))?
        .naive_utc();

    Ok(StoredLogEntry {
        id: row.try_get("id")?,
        entry: LogEntry {
            timestamp,
            level: row.try_get("level")?,
            source: row.try_get("source")?,
            message: row.try_get("message")?,
        },
    })
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn append(&self, entry: &LogEntry) -> Result<i64> {
        let result =
            sqlx::query("INSERT INTO logs (timestamp, level, source, message) VALUES (?, ?, ?, ?)")
                .bind(entry.timestamp.and_utc().timestamp())
                .bind(&entry.level)
                .bind(&entry.source)
                .bind(&entry.message)
                .execute(&self.pool)
                .await?;

        Ok(result.last_insert_rowid())
    }

    async fn query(&self, predicate: &Predicate) -> Result<Vec<StoredLogEntry>> {
        let sql = format!(
            "SELECT id, timestamp, level, source, message FROM logs WHERE {}{}",
            predicate.where_clause, predicate.tail
        );

        let mut q = sqlx::query(&sql);
        for param in &predicate.params {
            q = match param {
                SqlParam::Text(s) => q.bind(s.as_str()),
                SqlParam::Int(i) => q.bind(*i),
            };
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_entry).collect()
    }
}
