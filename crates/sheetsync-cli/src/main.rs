//! sheetsync CLI - operator tooling for the sheet/table sync pipeline
//!
//! Inspect the local table and change log, make local edits, and push
//! pending changes to the sheet.

mod cli;
mod commands;
mod error;

use clap::Parser;
use sheetsync_core::config::SyncSettings;

use crate::cli::{Cli, Commands};
use crate::commands::changes::run_changes;
use crate::commands::common::resolve_db_path;
use crate::commands::drain::run_drain;
use crate::commands::ingest::run_ingest;
use crate::commands::set::run_set;
use crate::commands::users::run_users;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sheetsync=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    tracing::debug!(db_path = %db_path.display(), "Resolved database path");

    match cli.command {
        Commands::Ingest { id, name, email } => {
            run_ingest(id, name, email, &db_path).await?;
        }
        Commands::Set { id, name, email } => {
            run_set(id, name, email, &db_path).await?;
        }
        Commands::Users { json } => run_users(json, &db_path).await?,
        Commands::Changes { limit, json } => run_changes(limit, json, &db_path).await?,
        Commands::Drain => {
            let settings = SyncSettings::from_env()?;
            run_drain(&settings, &db_path).await?;
        }
    }

    Ok(())
}
