use daylog_core::LogDate;

use crate::commands::common::{format_day_lines, reconcile_day, AppContext};
use crate::error::CliError;

pub async fn run_show(ctx: &AppContext, date: LogDate, as_json: bool) -> Result<(), CliError> {
    let view = reconcile_day(&ctx.orchestrator(), date).await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        for line in format_day_lines(&view) {
            println!("{line}");
        }
    }
    Ok(())
}
