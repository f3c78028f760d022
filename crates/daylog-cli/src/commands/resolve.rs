use daylog_core::LogDate;

use crate::cli::KeepSide;
use crate::commands::common::{format_day_lines, reconcile_day, AppContext, DayView};
use crate::error::CliError;

pub async fn run_resolve(ctx: &AppContext, date: LogDate, keep: KeepSide) -> Result<(), CliError> {
    let view = resolve_log(ctx, date, keep).await?;
    for line in format_day_lines(&view) {
        println!("{line}");
    }
    Ok(())
}

pub async fn resolve_log(
    ctx: &AppContext,
    date: LogDate,
    keep: KeepSide,
) -> Result<DayView, CliError> {
    ctx.require_session()?;
    let sync = ctx.orchestrator();
    // The conflict only exists once this process has compared both sides.
    reconcile_day(&sync, date).await;
    sync.resolve(date, keep.into()).await?;
    sync.flush().await;

    let view = DayView::from_snapshot(date, sync.snapshot());
    if view.conflict.is_some() {
        return Err(CliError::SyncFailed(date));
    }
    Ok(view)
}
