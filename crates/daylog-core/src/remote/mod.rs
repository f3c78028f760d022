//! Client side of the raw-log HTTP surface.

mod http;

use std::future::Future;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

pub use http::{normalize_api_url, HttpLogRemote, TOKEN_KEY};

use crate::models::{BackupRecord, LogDate, LogPush, ServerLogRecord};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Not signed in")]
    Unauthenticated,
    #[error("Session rejected by server: {0}")]
    Unauthorized(String),
    #[error("Invalid server configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server error: {0}")]
    Api(String),
    #[error("Token storage error: {0}")]
    TokenStorage(String),
}

impl RemoteError {
    /// Whether the failure means the user has to sign in again.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Unauthorized(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Server-side storage of raw logs as seen from a client.
///
/// Every method is scoped to the signed-in user.
pub trait LogRemote: Send + Sync + 'static {
    /// Whether a session token is available.
    fn is_authenticated(&self) -> bool;

    /// Server copy of one date, `None` when the server has nothing yet.
    fn fetch_log(
        &self,
        date: LogDate,
    ) -> impl Future<Output = RemoteResult<Option<ServerLogRecord>>> + Send;

    /// Unconditionally overwrite one date; returns the stored record.
    fn push_log(&self, push: &LogPush) -> impl Future<Output = RemoteResult<ServerLogRecord>> + Send;

    fn push_bulk(
        &self,
        logs: &[LogPush],
    ) -> impl Future<Output = RemoteResult<Vec<ServerLogRecord>>> + Send;

    fn fetch_all(&self) -> impl Future<Output = RemoteResult<Vec<ServerLogRecord>>> + Send;

    /// Pre-overwrite snapshots for one date, in server order.
    fn fetch_backups(
        &self,
        date: LogDate,
    ) -> impl Future<Output = RemoteResult<Vec<BackupRecord>>> + Send;
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorResponse>(body) {
        if let Some(message) = payload.error.or(payload.message) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = crate::util::compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
