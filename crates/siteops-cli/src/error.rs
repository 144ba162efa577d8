use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] siteops_core::Error),
    #[error(transparent)]
    Remote(#[from] siteops_core::PushError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Daily report summary cannot be empty")]
    EmptySummary,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error(
        "Sync is not configured. Set api_base_url in the client config or SITEOPS_API_BASE_URL."
    )]
    SyncNotConfigured,
    #[error("Failed to resolve a local data directory; pass --db-path")]
    NoDataDir,
}
