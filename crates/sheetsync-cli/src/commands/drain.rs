use std::path::Path;
use std::sync::Arc;

use sheetsync_core::config::SyncSettings;
use sheetsync_core::services::DatabaseService;
use sheetsync_core::sheets::SpreadsheetClient;
use sheetsync_core::sync::{DrainOutcome, SyncDispatcher};

use crate::commands::common::open_database;
use crate::error::CliError;

pub async fn run_drain(settings: &SyncSettings, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let sheets = Arc::new(settings.sheets_client()?);
    let outcome = drain_with(db, sheets, settings).await?;
    println!("{}", format_drain_outcome(outcome));
    Ok(())
}

pub async fn drain_with<S: SpreadsheetClient>(
    db: DatabaseService,
    sheets: Arc<S>,
    settings: &SyncSettings,
) -> Result<DrainOutcome, CliError> {
    let dispatcher = SyncDispatcher::new(db, sheets, settings.dispatcher.clone());
    Ok(dispatcher.drain().await?)
}

pub fn format_drain_outcome(outcome: DrainOutcome) -> String {
    match outcome {
        DrainOutcome::NoChanges => "No changes to sync".to_string(),
        DrainOutcome::Synced(report) if report.not_found == 0 => {
            format!("Synced {} change(s)", report.written)
        }
        DrainOutcome::Synced(report) => format!(
            "Synced {} change(s); {} row(s) not found in the sheet remain pending",
            report.written, report.not_found
        ),
    }
}
