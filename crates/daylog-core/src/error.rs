//! Error types for daylog-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using daylog-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in daylog-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local key/value storage fault (quota, backend failure)
    #[error("Storage error: {0}")]
    Storage(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backup file could not be interpreted
    #[error("Invalid backup: {0}")]
    InvalidBackup(String),

    /// No conflict is pending for the requested date
    #[error("No conflict to resolve for {0}")]
    NoConflict(String),

    /// Server round-trip failed
    #[error(transparent)]
    Remote(#[from] RemoteError),
}
