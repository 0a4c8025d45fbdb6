//! Database layer for sheetsync

mod change_log;
mod connection;
mod drain_lease;
mod migrations;
mod user_repository;

pub use change_log::{ChangeLogRepository, LibSqlChangeLogRepository};
pub use connection::Database;
pub use drain_lease::{DrainLeaseRepository, LibSqlDrainLeaseRepository, CHANGE_LOG_LEASE};
pub use user_repository::{LibSqlUserRepository, UpsertOutcome, UserRepository};

use libsql::{Row, Value};

use crate::error::{Error, Result};

/// Bind an optional string, mapping `None` to SQL NULL.
fn text_or_null(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

/// Read a nullable TEXT column.
fn optional_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(Error::Database(format!(
            "expected TEXT or NULL in column {idx}, found {other:?}"
        ))),
    }
}

/// Read a nullable INTEGER column.
fn optional_integer(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected INTEGER or NULL in column {idx}, found {other:?}"
        ))),
    }
}
