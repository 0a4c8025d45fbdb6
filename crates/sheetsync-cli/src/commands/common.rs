use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sheetsync_core::services::DatabaseService;
use sheetsync_core::{ChangeLogEntry, User};

use crate::error::CliError;

const DEFAULT_DB_PATH: &str = "sheetsync.db";

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("SHEETSYNC_DATABASE_PATH").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
}

pub async fn open_database(path: &Path) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(path).await?)
}

pub fn format_user_lines(users: &[User]) -> Vec<String> {
    users
        .iter()
        .map(|user| {
            format!(
                "{:>6}  {:<24}  {}",
                user.id,
                user.name.as_deref().unwrap_or("-"),
                user.email.as_deref().unwrap_or("-")
            )
        })
        .collect()
}

pub fn format_change_lines(changes: &[ChangeLogEntry], now_ms: i64) -> Vec<String> {
    changes
        .iter()
        .map(|change| {
            let state = if change.processed { "synced" } else { "pending" };
            format!(
                "#{:<6} {:<6} {}:{:<6} {:<7} {}",
                change.log_id,
                change.operation,
                change.table_name,
                change.row_id,
                state,
                format_relative_time(change.created_at, now_ms)
            )
        })
        .collect()
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
