//! User model: the record kept in agreement between the table and the sheet.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A row of the local `users` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable identity shared by the table and the sheet
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Last write timestamp (Unix ms), maintained by the store
    pub updated_at: i64,
}

impl User {
    /// The `(id, name, email)` projection shared with the spreadsheet.
    #[must_use]
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// The synchronized projection of a user.
///
/// This is the shape stored in change log payloads and returned by the read
/// model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserSnapshot {
    /// Cell values in sheet column order: id, name, email.
    ///
    /// Missing fields become empty strings so the overwrite clears stale cells.
    #[must_use]
    pub fn to_row(&self) -> Vec<serde_json::Value> {
        vec![
            serde_json::Value::from(self.id),
            serde_json::Value::from(self.name.clone().unwrap_or_default()),
            serde_json::Value::from(self.email.clone().unwrap_or_default()),
        ]
    }
}

/// An incoming mutation, as posted by the sheet webhook.
///
/// Every field is optional on the wire; absent fields are stored as NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl TryFrom<UserPayload> for UserSnapshot {
    type Error = Error;

    fn try_from(value: UserPayload) -> Result<Self> {
        let id = value
            .id
            .ok_or_else(|| Error::InvalidInput("payload is missing `id`".to_string()))?;
        Ok(Self {
            id,
            name: value.name,
            email: value.email,
        })
    }
}
