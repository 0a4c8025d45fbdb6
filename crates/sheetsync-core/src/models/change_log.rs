//! Change log model

use serde::{Deserialize, Serialize};

use super::UserSnapshot;

/// Table name recorded on entries produced for the `users` table
pub const USERS_TABLE: &str = "users";

/// Kind of local mutation that produced a change log entry.
///
/// Descriptive only: the dispatcher propagates the payload the same way for
/// every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Update,
}

impl ChangeOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
        }
    }
}

/// A durable record of one pending outward propagation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Insertion-ordered identifier
    pub log_id: i64,
    pub table_name: String,
    pub row_id: i64,
    /// Operation label as stored (entries may come from writers other than this crate)
    pub operation: String,
    /// JSON snapshot of the row at enqueue time
    pub payload: String,
    /// Set exactly once, after the remote write is confirmed
    pub processed: bool,
    /// Enqueue timestamp (Unix ms), the drain ordering key
    pub created_at: i64,
    /// When the entry was marked processed (Unix ms)
    pub processed_at: Option<i64>,
}

impl ChangeLogEntry {
    /// Decode the payload snapshot.
    pub fn snapshot(&self) -> serde_json::Result<UserSnapshot> {
        serde_json::from_str(&self.payload)
    }
}

/// A change to append to the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChange {
    pub table_name: String,
    pub row_id: i64,
    pub operation: ChangeOperation,
    pub payload: String,
}

impl NewChange {
    /// Build a `users` table change carrying the given snapshot.
    pub fn for_user(
        snapshot: &UserSnapshot,
        operation: ChangeOperation,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            table_name: USERS_TABLE.to_string(),
            row_id: snapshot.id,
            operation,
            payload: serde_json::to_string(snapshot)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_decodes_payload() {
        let entry = ChangeLogEntry {
            log_id: 1,
            table_name: USERS_TABLE.to_string(),
            row_id: 7,
            operation: "UPDATE".to_string(),
            payload: r#"{"id":7,"name":"Ann","email":"ann@x.com"}"#.to_string(),
            processed: false,
            created_at: 1,
            processed_at: None,
        };
        let snapshot = entry.snapshot().unwrap();
        assert_eq!(snapshot.id, 7);
        assert_eq!(snapshot.email.as_deref(), Some("ann@x.com"));
    }

    #[test]
    fn new_change_serializes_snapshot() {
        let snapshot = UserSnapshot {
            id: 3,
            name: Some("Bo".to_string()),
            email: None,
        };
        let change = NewChange::for_user(&snapshot, ChangeOperation::Insert).unwrap();
        assert_eq!(change.row_id, 3);
        assert_eq!(change.operation.as_str(), "INSERT");
        assert_eq!(change.payload, r#"{"id":3,"name":"Bo","email":null}"#);
    }
}
