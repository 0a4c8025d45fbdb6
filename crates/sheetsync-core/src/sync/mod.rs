//! Table-to-sheet change propagation.
//!
//! [`SyncDispatcher`] drains the change log in creation order, locating each
//! entry's row in the sheet with a [`RowLocator`] and overwriting it. An entry
//! is marked processed only after its write is confirmed.

mod dispatcher;
mod locator;

use thiserror::Error;

use crate::backoff::BackoffError;

pub use dispatcher::{DrainOutcome, DrainReport, SyncDispatcher};
pub use locator::{find_row, index_rows, RowLocator};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] crate::Error),
    #[error(transparent)]
    Remote(#[from] BackoffError),
    #[error("Change log entry {log_id} has an invalid payload: {source}")]
    InvalidPayload {
        log_id: i64,
        source: serde_json::Error,
    },
    #[error("A drain is already in progress")]
    DrainInProgress,
    #[error("Drain deadline exceeded")]
    DrainTimeout,
}
