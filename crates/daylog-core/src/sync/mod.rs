//! Debounced push/pull between the local version store and the server.
//!
//! The orchestrator consumes [`SyncEvent`]s. Edits are persisted
//! synchronously and pushed after a quiet period; navigation and login pull
//! the server copy and reconcile it through a
//! [`ConflictDetector`](crate::ConflictDetector). Observers follow along
//! through a `watch` channel of [`SyncSnapshot`]s for the active date.

mod orchestrator;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use orchestrator::SyncOrchestrator;

use crate::models::LogDate;

/// Inputs to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The user changed the text for `date`.
    Edited { date: LogDate, content: String },
    /// The user opened `date`.
    Navigated(LogDate),
    /// A session became available; the active date is reconciled again.
    LoggedIn,
    /// The user picked one side of a diverged conflict.
    ResolveConflict { date: LogDate, choice: Resolution },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "local")]
    KeepLocal,
    #[serde(rename = "server")]
    KeepServer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Pending,
    Syncing,
    Synced,
    Error,
}

impl SyncStatus {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Both sides of a diverged log, held until the user picks one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    pub local_content: String,
    pub server_content: String,
    pub local_hash: String,
    pub server_hash: String,
    pub local_updated_at: DateTime<Utc>,
    pub server_updated_at: DateTime<Utc>,
}

/// What an observer of the active date sees.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncSnapshot {
    pub date: Option<LogDate>,
    pub content: String,
    pub status: SyncStatus,
    pub conflict: Option<SyncConflict>,
    pub last_synced_at: Option<DateTime<Utc>>,
}
