//! Change log drain.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{RowLocator, SyncError};
use crate::backoff::BackoffExecutor;
use crate::config::DispatcherConfig;
use crate::models::ChangeLogEntry;
use crate::services::DatabaseService;
use crate::sheets::SpreadsheetClient;

/// Counts for a drain that found pending entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Entries pending when the drain started
    pub pending: usize,
    /// Entries written to the sheet and marked processed
    pub written: usize,
    /// Entries whose row was not in the sheet; they stay pending
    pub not_found: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    NoChanges,
    Synced(DrainReport),
}

enum EntryOutcome {
    Written,
    NotFound,
}

/// Lease lifetime beyond the drain deadline
const LEASE_GRACE: Duration = Duration::from_secs(30);
/// Lease lifetime when drains have no deadline
const UNBOUNDED_LEASE_TTL: Duration = Duration::from_secs(60 * 60);

/// Propagates pending change log entries to the sheet.
///
/// At most one drain runs at a time per database: clones of a dispatcher
/// share an in-process lock, and every drain also holds a lease row in the
/// database so dispatchers in other processes are excluded.
pub struct SyncDispatcher<S> {
    db: DatabaseService,
    sheets: Arc<S>,
    config: DispatcherConfig,
    executor: BackoffExecutor,
    in_flight: Arc<Mutex<()>>,
    holder: Arc<str>,
}

impl<S> Clone for SyncDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            sheets: Arc::clone(&self.sheets),
            config: self.config.clone(),
            executor: self.executor,
            in_flight: Arc::clone(&self.in_flight),
            holder: Arc::clone(&self.holder),
        }
    }
}

impl<S: SpreadsheetClient> SyncDispatcher<S> {
    pub fn new(db: DatabaseService, sheets: Arc<S>, config: DispatcherConfig) -> Self {
        let executor = BackoffExecutor::new(config.retry);
        let holder = format!("{}-{:016x}", std::process::id(), rand::random::<u64>());
        Self {
            db,
            sheets,
            config,
            executor,
            in_flight: Arc::new(Mutex::new(())),
            holder: holder.into(),
        }
    }

    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Drain all pending entries in creation order.
    ///
    /// Entries whose write was confirmed are marked processed even when the
    /// drain stops early on a failure or the deadline.
    pub async fn drain(&self) -> Result<DrainOutcome, SyncError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!("Drain requested while another drain is running");
            return Err(SyncError::DrainInProgress);
        };
        if !self
            .db
            .acquire_drain_lease(&self.holder, self.lease_ttl())
            .await?
        {
            tracing::debug!("Drain lease held by another dispatcher");
            return Err(SyncError::DrainInProgress);
        }

        let mut confirmed = Vec::new();
        let result = self.drain_leased(&mut confirmed).await;
        let committed = self.commit(&confirmed).await;

        if let Err(error) = &result {
            tracing::warn!(
                confirmed = confirmed.len(),
                error = %error,
                "Drain aborted"
            );
        }
        let outcome = result?;
        committed?;

        if let DrainOutcome::Synced(report) = outcome {
            tracing::info!(
                written = report.written,
                not_found = report.not_found,
                "Drain complete"
            );
        }
        Ok(outcome)
    }

    fn lease_ttl(&self) -> Duration {
        self.config
            .drain_timeout
            .map_or(UNBOUNDED_LEASE_TTL, |timeout| timeout.saturating_add(LEASE_GRACE))
    }

    async fn drain_leased(&self, confirmed: &mut Vec<i64>) -> Result<DrainOutcome, SyncError> {
        let pending = self.db.pending_changes().await?;
        if pending.is_empty() {
            tracing::debug!("No pending changes");
            return Ok(DrainOutcome::NoChanges);
        }

        tracing::info!(pending = pending.len(), "Draining change log");
        let deadline = self
            .config
            .drain_timeout
            .map(|timeout| Instant::now() + timeout);

        let mut report = DrainReport {
            pending: pending.len(),
            ..DrainReport::default()
        };
        self.process(&pending, deadline, confirmed, &mut report)
            .await?;
        Ok(DrainOutcome::Synced(report))
    }

    async fn process(
        &self,
        pending: &[ChangeLogEntry],
        deadline: Option<Instant>,
        confirmed: &mut Vec<i64>,
        report: &mut DrainReport,
    ) -> Result<(), SyncError> {
        let target = &self.config.target;
        let mut locator =
            RowLocator::new(&*self.sheets, &self.executor, target, self.config.locate);

        for entry in pending {
            match within(deadline, self.sync_entry(entry, &mut locator)).await?? {
                EntryOutcome::Written => {
                    confirmed.push(entry.log_id);
                    report.written += 1;
                }
                EntryOutcome::NotFound => report.not_found += 1,
            }
        }
        Ok(())
    }

    async fn sync_entry(
        &self,
        entry: &ChangeLogEntry,
        locator: &mut RowLocator<'_, S>,
    ) -> Result<EntryOutcome, SyncError> {
        let snapshot = entry
            .snapshot()
            .map_err(|source| SyncError::InvalidPayload {
                log_id: entry.log_id,
                source,
            })?;

        let Some(row) = locator.locate(snapshot.id).await? else {
            tracing::warn!(
                log_id = entry.log_id,
                row_id = snapshot.id,
                "Row not found in sheet; leaving entry pending"
            );
            return Ok(EntryOutcome::NotFound);
        };

        let sheets = &*self.sheets;
        let spreadsheet_id = self.config.target.spreadsheet_id.as_str();
        let range = self.config.target.row_range(row).to_string();
        let range = range.as_str();
        let values = vec![snapshot.to_row()];
        self.executor
            .execute("write_range", move || {
                sheets.write_range(spreadsheet_id, range, values.clone())
            })
            .await?;

        tracing::debug!(log_id = entry.log_id, row_id = snapshot.id, row, "Wrote row");
        Ok(EntryOutcome::Written)
    }

    /// Commit confirmed marks and release the lease.
    async fn commit(&self, confirmed: &[i64]) -> Result<(), SyncError> {
        match self.db.finish_drain(&self.holder, confirmed).await {
            Ok(marked) => {
                tracing::debug!(marked, "Marked entries processed");
                Ok(())
            }
            Err(error) => {
                tracing::error!(error = %error, "Failed to mark entries processed");
                Err(error.into())
            }
        }
    }
}

async fn within<F: Future>(deadline: Option<Instant>, future: F) -> Result<F::Output, SyncError> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future)
            .await
            .map_err(|_| SyncError::DrainTimeout),
        None => Ok(future.await),
    }
}
