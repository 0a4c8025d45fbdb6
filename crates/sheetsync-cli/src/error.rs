use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] sheetsync_core::Error),
    #[error(transparent)]
    Sync(#[from] sheetsync_core::sync::SyncError),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Limit must be at least 1")]
    InvalidLimit,
}
