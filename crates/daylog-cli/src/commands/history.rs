use daylog_core::util::compact_text;
use daylog_core::{BackupRecord, LogDate};

use crate::commands::common::{format_timestamp, AppContext};
use crate::error::CliError;

pub async fn run_history(ctx: &AppContext, date: LogDate, as_json: bool) -> Result<(), CliError> {
    ctx.require_session()?;
    let backups = ctx.backups().log_history(date).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&backups)?);
        return Ok(());
    }
    if backups.is_empty() {
        println!("No earlier versions of {date} on the server.");
        return Ok(());
    }
    for line in format_history_lines(&backups) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_history_lines(backups: &[BackupRecord]) -> Vec<String> {
    backups
        .iter()
        .map(|backup| {
            format!(
                "{} v{} {}",
                format_timestamp(backup.backed_up_at),
                backup.original_version,
                compact_text(&backup.content)
            )
        })
        .collect()
}
