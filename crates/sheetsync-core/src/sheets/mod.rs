//! Spreadsheet service access.
//!
//! The sync pipeline only needs two remote operations, a range read and a
//! range overwrite, expressed by [`SpreadsheetClient`]. [`GoogleSheetsClient`]
//! talks to the Google Sheets v4 `values` API; [`InMemorySpreadsheet`] keeps a
//! grid in memory and can be scripted to fail.

mod auth;
mod google;
mod memory;
mod range;

use std::future::Future;

use thiserror::Error;

pub use auth::{Credentials, ServiceAccountKey};
pub use google::{GoogleSheetsClient, DEFAULT_SHEETS_API_URL};
pub use memory::InMemorySpreadsheet;
pub use range::{column_index, column_letters, A1Range};

/// Rows of cell values, in row-major order
pub type CellRows = Vec<Vec<serde_json::Value>>;

/// HTTP statuses the remote API uses for rate limiting and unavailability
pub const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("Sheets API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Sheets HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid Sheets response: {0}")]
    InvalidResponse(String),
    #[error("Sheets credentials error: {0}")]
    Credentials(String),
    #[error("Invalid Sheets configuration: {0}")]
    InvalidConfiguration(String),
}

/// How a failed remote call should be treated by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Likely to succeed on retry (rate limited, temporarily unavailable)
    Transient,
    /// Confirmed rejection; retrying would only mask a configuration error
    Fatal,
    /// Anything else (transport errors, undecodable responses)
    Unclassified,
}

impl SheetsError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            Self::Api { status, .. } if TRANSIENT_STATUSES.contains(status) => {
                FailureClass::Transient
            }
            Self::Api { .. } | Self::Credentials(_) | Self::InvalidConfiguration(_) => {
                FailureClass::Fatal
            }
            Self::Http(_) | Self::InvalidResponse(_) => FailureClass::Unclassified,
        }
    }
}

/// Remote spreadsheet operations used by the sync pipeline.
///
/// Ranges use A1 notation (`users!A2:C`). Writes use literal (RAW) value
/// semantics.
pub trait SpreadsheetClient: Send + Sync {
    /// Read the cell values of a range; trailing empty rows may be omitted.
    fn read_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
    ) -> impl Future<Output = Result<CellRows, SheetsError>> + Send;

    /// Overwrite a range with the given values.
    fn write_range(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: CellRows,
    ) -> impl Future<Output = Result<(), SheetsError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        for status in TRANSIENT_STATUSES {
            assert_eq!(
                SheetsError::api(status, "try later").class(),
                FailureClass::Transient
            );
        }
    }

    #[test]
    fn permission_errors_are_fatal() {
        assert_eq!(
            SheetsError::api(403, "The caller does not have permission").class(),
            FailureClass::Fatal
        );
        assert_eq!(
            SheetsError::api(400, "Unable to parse range").class(),
            FailureClass::Fatal
        );
        assert_eq!(
            SheetsError::Credentials("bad key".to_string()).class(),
            FailureClass::Fatal
        );
    }

    #[test]
    fn undecodable_responses_are_unclassified() {
        assert_eq!(
            SheetsError::InvalidResponse("truncated body".to_string()).class(),
            FailureClass::Unclassified
        );
        assert_eq!(
            SheetsError::InvalidResponse(String::new()).status(),
            None
        );
    }
}
