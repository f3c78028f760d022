use std::io::{self, IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use daylog_core::util::compact_text;
use daylog_core::{
    BackupService, ClientConfig, HttpLogRemote, LocalVersionStore, LogDate, LogRemote,
    SqliteStore, SyncConflict, SyncOrchestrator, SyncSnapshot, SyncStatus,
};
use serde::Serialize;

use crate::error::CliError;

pub type Remote = HttpLogRemote<SqliteStore>;
pub type Orchestrator = SyncOrchestrator<SqliteStore, Remote>;

/// Local store and API client for one invocation.
pub struct AppContext {
    pub store: Arc<LocalVersionStore<SqliteStore>>,
    pub remote: Arc<Remote>,
    pub debounce: Duration,
}

impl AppContext {
    pub fn open(db_path: Option<&Path>, api_url: Option<&str>) -> Result<Self, CliError> {
        let config = ClientConfig::from_env()?;
        let data_path = db_path.map_or_else(|| config.data_path.clone(), Path::to_path_buf);
        let api_url = api_url.unwrap_or(&config.api_url);
        Self::with_settings(&data_path, api_url, config.push_debounce)
    }

    pub fn with_settings(
        data_path: &Path,
        api_url: &str,
        debounce: Duration,
    ) -> Result<Self, CliError> {
        let entries = Arc::new(SqliteStore::open(data_path)?);
        let remote = Arc::new(HttpLogRemote::new(api_url, Arc::clone(&entries))?);
        tracing::debug!(path = %data_path.display(), api = remote.base_url(), "Opened local store");
        Ok(Self {
            store: Arc::new(LocalVersionStore::new(entries)),
            remote,
            debounce,
        })
    }

    pub fn orchestrator(&self) -> Orchestrator {
        SyncOrchestrator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.remote),
            self.debounce,
        )
    }

    pub fn backups(&self) -> BackupService<SqliteStore, Remote> {
        BackupService::new(Arc::clone(&self.store), Arc::clone(&self.remote))
    }

    pub fn require_session(&self) -> Result<(), CliError> {
        if self.remote.is_authenticated() {
            Ok(())
        } else {
            Err(CliError::NotSignedIn)
        }
    }
}

/// One day as the CLI reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayView {
    pub date: LogDate,
    pub content: String,
    pub status: SyncStatus,
    pub conflict: Option<SyncConflict>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl DayView {
    pub fn from_snapshot(date: LogDate, snapshot: SyncSnapshot) -> Self {
        Self {
            date,
            content: snapshot.content,
            status: snapshot.status,
            conflict: snapshot.conflict,
            last_synced_at: snapshot.last_synced_at,
        }
    }
}

/// Reconcile `date` with the server and wait for any push it triggers.
pub async fn reconcile_day(sync: &Orchestrator, date: LogDate) -> DayView {
    sync.navigate(date).await;
    sync.flush().await;
    DayView::from_snapshot(date, sync.snapshot())
}

pub fn format_day_lines(view: &DayView) -> Vec<String> {
    let mut lines = vec![format!("{} [{}]", view.date, view.status)];
    if let Some(at) = view.last_synced_at {
        lines.push(format!("last synced {}", format_timestamp(at)));
    }
    if let Some(conflict) = &view.conflict {
        lines.push("conflict: this day was edited on another device".to_string());
        lines.push(format!(
            "  local  ({}): {}",
            format_timestamp(conflict.local_updated_at),
            compact_text(&conflict.local_content)
        ));
        lines.push(format!(
            "  server ({}): {}",
            format_timestamp(conflict.server_updated_at),
            compact_text(&conflict.server_content)
        ));
        lines.push(format!(
            "  run `daylog resolve {} --keep local|server`",
            view.date
        ));
    }
    lines.push(String::new());
    if view.content.is_empty() {
        lines.push("(empty)".to_string());
    } else {
        lines.extend(view.content.lines().map(str::to_string));
    }
    lines
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Text from arguments, falling back to piped stdin.
pub fn resolve_text(parts: &[String]) -> Result<String, CliError> {
    let text = if parts.is_empty() {
        read_piped_stdin()?.unwrap_or_default()
    } else {
        parts.join(" ")
    };
    normalize_text(&text).ok_or(CliError::EmptyContent)
}

/// Drop trailing whitespace; `None` when nothing is left.
pub fn normalize_text(text: &str) -> Option<String> {
    let trimmed = text.trim_end();
    if trimmed.trim().is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut buffer = String::new();
    stdin.read_to_string(&mut buffer)?;
    Ok(Some(buffer))
}
