use std::path::Path;

use crate::commands::common::{format_change_lines, now_ms, open_database};
use crate::error::CliError;

pub async fn run_changes(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    if limit == 0 {
        return Err(CliError::InvalidLimit);
    }

    let db = open_database(db_path).await?;
    let changes = db.recent_changes(limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }

    if changes.is_empty() {
        println!("No changes recorded.");
        return Ok(());
    }

    for line in format_change_lines(&changes, now_ms()) {
        println!("{line}");
    }
    Ok(())
}
