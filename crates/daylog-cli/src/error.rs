use std::io;

use daylog_core::LogDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] daylog_core::Error),
    #[error(transparent)]
    Remote(#[from] daylog_core::RemoteError),
    #[error(transparent)]
    Config(#[from] daylog_core::ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No log text provided")]
    EmptyContent,
    #[error("Password cannot be empty")]
    EmptyPassword,
    #[error("Not signed in. Run `daylog login` first.")]
    NotSignedIn,
    #[error(
        "{0} has diverged from the server. Run `daylog resolve {0} --keep local|server` first."
    )]
    UnresolvedConflict(LogDate),
    #[error("Sync failed for {0}; the change is saved locally and will be pushed on the next run")]
    SyncFailed(LogDate),
}
