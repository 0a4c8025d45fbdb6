use std::path::Path;

use sheetsync_core::{ChangeLogEntry, User, UserSnapshot};

use crate::commands::common::open_database;
use crate::error::CliError;

/// Apply an edit on top of the current row; omitted fields keep their value.
pub fn merge_edit(
    id: i64,
    existing: Option<&User>,
    name: Option<String>,
    email: Option<String>,
) -> UserSnapshot {
    let current = existing.map(User::snapshot);
    UserSnapshot {
        id,
        name: name.or_else(|| current.as_ref().and_then(|user| user.name.clone())),
        email: email.or_else(|| current.and_then(|user| user.email)),
    }
}

pub async fn run_set(
    id: i64,
    name: Option<String>,
    email: Option<String>,
    db_path: &Path,
) -> Result<(User, ChangeLogEntry), CliError> {
    let db = open_database(db_path).await?;
    let existing = db.get_user(id).await?;
    let snapshot = merge_edit(id, existing.as_ref(), name, email);
    let (user, entry) = db.save_user(&snapshot).await?;
    println!(
        "Saved user {} (change #{} {}, pending sync)",
        user.id, entry.log_id, entry.operation
    );
    Ok((user, entry))
}
