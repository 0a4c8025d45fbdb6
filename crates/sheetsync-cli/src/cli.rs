use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sheetsync")]
#[command(about = "Keep a spreadsheet and the users table in agreement")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the local database file (overrides SHEETSYNC_DATABASE_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upsert a record as if it arrived from the sheet webhook (not propagated back)
    Ingest {
        /// Record id
        #[arg(long)]
        id: i64,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Email address
        #[arg(long)]
        email: Option<String>,
    },
    /// Edit a record locally and queue the change for the sheet
    Set {
        /// Record id
        id: i64,
        /// New display name (kept when omitted)
        #[arg(long)]
        name: Option<String>,
        /// New email address (kept when omitted)
        #[arg(long)]
        email: Option<String>,
    },
    /// List users in the local table
    Users {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent change log entries
    Changes {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push pending changes to the sheet
    Drain,
}
