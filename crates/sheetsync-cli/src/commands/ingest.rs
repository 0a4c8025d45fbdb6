use std::path::Path;

use sheetsync_core::{User, UserPayload};

use crate::commands::common::open_database;
use crate::error::CliError;

pub async fn run_ingest(
    id: i64,
    name: Option<String>,
    email: Option<String>,
    db_path: &Path,
) -> Result<User, CliError> {
    let db = open_database(db_path).await?;
    let user = db
        .ingest(UserPayload {
            id: Some(id),
            name,
            email,
        })
        .await?;
    println!("Ingested user {}", user.id);
    Ok(user)
}
