use daylog_core::{LogDate, LogRemote, SyncStatus};

use crate::commands::common::{reconcile_day, AppContext, DayView};
use crate::error::CliError;

pub async fn run_write(
    ctx: &AppContext,
    date: LogDate,
    append: bool,
    text: String,
) -> Result<(), CliError> {
    let view = write_log(ctx, date, append, &text).await?;
    let note = match view.status {
        SyncStatus::Synced => "synced",
        _ if !ctx.remote.is_authenticated() => "saved locally (not signed in)",
        _ => "saved locally",
    };
    println!("{date}: {note}");
    Ok(())
}

/// Reconcile first so a stale local copy never overwrites newer server text.
pub async fn write_log(
    ctx: &AppContext,
    date: LogDate,
    append: bool,
    text: &str,
) -> Result<DayView, CliError> {
    let sync = ctx.orchestrator();
    let before = reconcile_day(&sync, date).await;
    if before.conflict.is_some() {
        return Err(CliError::UnresolvedConflict(date));
    }

    let content = compose_content(&before.content, text, append);
    sync.edit(date, &content);
    sync.flush().await;

    let view = DayView::from_snapshot(date, sync.snapshot());
    if view.status == SyncStatus::Error {
        return Err(CliError::SyncFailed(date));
    }
    Ok(view)
}

pub fn compose_content(existing: &str, text: &str, append: bool) -> String {
    if !append || existing.is_empty() {
        return text.to_string();
    }
    if existing.ends_with('\n') {
        format!("{existing}{text}")
    } else {
        format!("{existing}\n{text}")
    }
}
