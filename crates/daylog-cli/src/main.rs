//! daylog CLI - read, write and sync daily logs from the terminal

mod cli;
mod commands;
mod error;


use clap::Parser;
use daylog_core::LogDate;

use crate::cli::{BackupCommands, Cli, Commands};
use crate::commands::auth_cmd::{run_auth, run_logout, AuthAction};
use crate::commands::backup::{run_export, run_import};
use crate::commands::common::{resolve_text, AppContext};
use crate::commands::history::run_history;
use crate::commands::resolve::run_resolve;
use crate::commands::show::run_show;
use crate::commands::write::run_write;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("daylog=info".parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::open(cli.db_path.as_deref(), cli.api_url.as_deref())?;

    match cli.command {
        Commands::Show { date, json } => {
            run_show(&ctx, date.unwrap_or_else(LogDate::today), json).await?;
        }
        Commands::Write { date, append, text } => {
            let text = resolve_text(&text)?;
            run_write(&ctx, date.unwrap_or_else(LogDate::today), append, text).await?;
        }
        Commands::Resolve { date, keep } => run_resolve(&ctx, date, keep).await?,
        Commands::History { date, json } => {
            run_history(&ctx, date.unwrap_or_else(LogDate::today), json).await?;
        }
        Commands::Backup { command } => match command {
            BackupCommands::Export {
                server,
                output,
                dir,
            } => run_export(&ctx, server, output.as_deref(), dir.as_deref()).await?,
            BackupCommands::Import { path } => run_import(&ctx, &path).await?,
        },
        Commands::Signup(credentials) => run_auth(&ctx, AuthAction::SignUp, credentials).await?,
        Commands::Login(credentials) => run_auth(&ctx, AuthAction::SignIn, credentials).await?,
        Commands::Logout => run_logout(&ctx)?,
    }

    Ok(())
}
