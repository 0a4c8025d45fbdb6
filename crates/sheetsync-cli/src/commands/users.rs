use std::path::Path;

use sheetsync_core::User;

use crate::commands::common::{format_user_lines, open_database};
use crate::error::CliError;

pub async fn run_users(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let users = db.list_users().await?;

    if as_json {
        let items = users.iter().map(User::snapshot).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }

    for line in format_user_lines(&users) {
        println!("{line}");
    }
    Ok(())
}
