use std::time::Duration;

use sheetsync_core::sheets::SpreadsheetClient;
use sheetsync_core::sync::{DrainOutcome, SyncDispatcher, SyncError};
use tokio::task::JoinHandle;

/// Drain the change log every `interval` in the background.
///
/// A tick that finds a drain already running (for example one triggered over
/// HTTP) is skipped.
pub fn spawn_poller<S: SpreadsheetClient + 'static>(
    dispatcher: SyncDispatcher<S>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Change log poller started");
        loop {
            tokio::time::sleep(interval).await;
            match dispatcher.drain().await {
                Ok(DrainOutcome::NoChanges) => {}
                Ok(DrainOutcome::Synced(report)) => {
                    tracing::debug!(
                        written = report.written,
                        not_found = report.not_found,
                        "Poller drain complete"
                    );
                }
                Err(SyncError::DrainInProgress) => {
                    tracing::debug!("Poller tick skipped; drain already running");
                }
                Err(error) => {
                    tracing::error!("Periodic drain failed: {}", error);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use sheetsync_core::config::{DispatcherConfig, SheetTarget};
    use sheetsync_core::models::{ChangeOperation, NewChange};
    use sheetsync_core::services::DatabaseService;
    use sheetsync_core::sheets::InMemorySpreadsheet;
    use sheetsync_core::UserSnapshot;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn poller_drains_pending_changes() {
        let db = DatabaseService::open_in_memory().await.unwrap();
        let sheets = InMemorySpreadsheet::with_rows(
            "users",
            vec![
                vec![json!("id"), json!("name"), json!("email")],
                vec![json!("1"), json!("Ann"), json!("")],
            ],
        );
        let dispatcher = SyncDispatcher::new(
            db.clone(),
            Arc::new(sheets.clone()),
            DispatcherConfig::new(SheetTarget::new("sheet-id", "users")),
        );
        let snapshot = UserSnapshot {
            id: 1,
            name: Some("Anne".to_string()),
            email: None,
        };
        db.enqueue_change(&NewChange::for_user(&snapshot, ChangeOperation::Update).unwrap())
            .await
            .unwrap();

        let handle = spawn_poller(dispatcher, Duration::from_millis(10));
        for _ in 0..200 {
            if db.pending_changes().await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert!(db.pending_changes().await.unwrap().is_empty());
        assert_eq!(
            sheets.row("users", 2),
            Some(vec![json!(1), json!("Anne"), json!("")])
        );
    }
}
