//! Change log store
//!
//! The change log is an append-only queue of pending outward propagations.
//! Entries are never deleted; the `processed` flag flips exactly once, after
//! the remote write has been confirmed, and the row then remains as an audit
//! record.

use crate::error::Result;
use crate::models::{ChangeLogEntry, NewChange};
use crate::util::unix_millis_now;
use libsql::params::Params;
use libsql::{Connection, Row, Value};

use super::optional_integer;

const ENTRY_COLUMNS: &str =
    "log_id, table_name, row_id, operation, payload, processed, created_at, processed_at";

/// Trait for change log operations (async)
#[allow(async_fn_in_trait)]
pub trait ChangeLogRepository {
    /// Append a pending entry
    async fn append(&self, change: &NewChange) -> Result<ChangeLogEntry>;

    /// All unprocessed entries in drain order (`created_at`, then `log_id`)
    async fn fetch_pending(&self) -> Result<Vec<ChangeLogEntry>>;

    /// Flip an entry to processed.
    ///
    /// Returns `false` when the entry was already processed (or does not
    /// exist); the call is then a no-op.
    async fn mark_processed(&self, log_id: i64) -> Result<bool>;

    /// Most recent entries regardless of state, newest first
    async fn list_recent(&self, limit: usize) -> Result<Vec<ChangeLogEntry>>;
}

/// libSQL implementation of `ChangeLogRepository`
pub struct LibSqlChangeLogRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlChangeLogRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &Row) -> Result<ChangeLogEntry> {
        Ok(ChangeLogEntry {
            log_id: row.get(0)?,
            table_name: row.get(1)?,
            row_id: row.get(2)?,
            operation: row.get(3)?,
            payload: row.get(4)?,
            processed: row.get::<i64>(5)? != 0,
            created_at: row.get(6)?,
            processed_at: optional_integer(row, 7)?,
        })
    }

    async fn collect(&self, sql: &str, params: Params) -> Result<Vec<ChangeLogEntry>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }
}

impl ChangeLogRepository for LibSqlChangeLogRepository<'_> {
    async fn append(&self, change: &NewChange) -> Result<ChangeLogEntry> {
        let created_at = unix_millis_now();
        self.conn
            .execute(
                "INSERT INTO change_log (table_name, row_id, operation, payload, processed, created_at)
                 VALUES (?, ?, ?, ?, 0, ?)",
                Params::Positional(vec![
                    Value::Text(change.table_name.clone()),
                    Value::Integer(change.row_id),
                    Value::Text(change.operation.as_str().to_string()),
                    Value::Text(change.payload.clone()),
                    Value::Integer(created_at),
                ]),
            )
            .await?;

        Ok(ChangeLogEntry {
            log_id: self.conn.last_insert_rowid(),
            table_name: change.table_name.clone(),
            row_id: change.row_id,
            operation: change.operation.as_str().to_string(),
            payload: change.payload.clone(),
            processed: false,
            created_at,
            processed_at: None,
        })
    }

    async fn fetch_pending(&self) -> Result<Vec<ChangeLogEntry>> {
        self.collect(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM change_log
                 WHERE processed = 0
                 ORDER BY created_at ASC, log_id ASC"
            ),
            Params::None,
        )
        .await
    }

    async fn mark_processed(&self, log_id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE change_log SET processed = 1, processed_at = ?
                 WHERE log_id = ? AND processed = 0",
                [unix_millis_now(), log_id],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.collect(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM change_log
                 ORDER BY log_id DESC
                 LIMIT ?"
            ),
            Params::Positional(vec![Value::Integer(limit)]),
        )
        .await
    }
}
