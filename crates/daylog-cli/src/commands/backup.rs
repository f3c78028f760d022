use std::path::{Path, PathBuf};

use daylog_core::backup::suggested_file_name;
use daylog_core::{BackupBundle, BackupKind, ImportReport, LogDate};

use crate::commands::common::AppContext;
use crate::error::CliError;

pub async fn run_export(
    ctx: &AppContext,
    server: bool,
    output_path: Option<&Path>,
    output_dir: Option<&Path>,
) -> Result<(), CliError> {
    let (kind, bundle) = export_bundle(ctx, server).await?;
    let rendered = bundle.to_json_pretty()?;

    match export_target(kind, output_path, output_dir) {
        Some(path) => {
            std::fs::write(&path, rendered)?;
            println!("{}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

pub async fn export_bundle(
    ctx: &AppContext,
    server: bool,
) -> Result<(BackupKind, BackupBundle), CliError> {
    if server {
        ctx.require_session()?;
        Ok((BackupKind::Server, ctx.backups().export_server_backup().await?))
    } else {
        Ok((BackupKind::Local, ctx.backups().create_backup()?))
    }
}

pub fn export_target(
    kind: BackupKind,
    output_path: Option<&Path>,
    output_dir: Option<&Path>,
) -> Option<PathBuf> {
    output_path.map(Path::to_path_buf).or_else(|| {
        output_dir.map(|dir| dir.join(suggested_file_name(kind, LogDate::today())))
    })
}

pub async fn run_import(ctx: &AppContext, path: &Path) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(path)?;
    let report = ctx.backups().import_backup(&raw).await?;
    for line in format_import_report(&report) {
        println!("{line}");
    }
    if !report.failed.is_empty() {
        eprintln!("Entries that did not apply: {}", report.failed.join(", "));
    }
    Ok(())
}

pub fn format_import_report(report: &ImportReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Imported {} logs and {} settings",
        report.applied_logs, report.applied_settings
    )];
    if report.synced_to_server {
        lines.push("Logs were pushed to the server as new versions".to_string());
    }
    lines
}
