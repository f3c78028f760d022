use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use daylog_core::{LogDate, Resolution};

#[derive(Parser)]
#[command(name = "daylog")]
#[command(about = "Keep a plain-text log for every day, synced across devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local store (defaults to DAYLOG_DATA_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional API base URL (defaults to DAYLOG_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a day's log after reconciling it with the server
    Show {
        /// Date as YYYY-MM-DD (today when omitted)
        date: Option<LogDate>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace or extend a day's log and push it
    Write {
        /// Date as YYYY-MM-DD (today when omitted)
        #[arg(short, long)]
        date: Option<LogDate>,
        /// Append to the existing text instead of replacing it
        #[arg(short, long)]
        append: bool,
        /// Log text (read from stdin when omitted)
        text: Vec<String>,
    },
    /// Settle a diverged log by keeping one side
    Resolve {
        /// Date as YYYY-MM-DD
        date: LogDate,
        /// Which side to keep
        #[arg(long, value_enum)]
        keep: KeepSide,
    },
    /// List server-side snapshots of a day's log, newest first
    History {
        /// Date as YYYY-MM-DD (today when omitted)
        date: Option<LogDate>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export or import backup files
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    /// Create an account and sign in
    Signup(CredentialArgs),
    /// Sign in to an existing account
    Login(CredentialArgs),
    /// Forget the stored session
    Logout,
}

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Write a backup bundle
    Export {
        /// Export what the server holds instead of the local store
        #[arg(long)]
        server: bool,
        /// Output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Write into this directory using the suggested file name
        #[arg(long, value_name = "DIR", conflicts_with = "output")]
        dir: Option<PathBuf>,
    },
    /// Replace local logs with a backup bundle
    Import {
        /// Backup file to read
        path: PathBuf,
    },
}

#[derive(clap::Args)]
pub struct CredentialArgs {
    /// Account name
    #[arg(short, long)]
    pub username: String,
    /// Password (read from stdin when omitted)
    #[arg(short, long)]
    pub password: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KeepSide {
    Local,
    Server,
}

impl From<KeepSide> for Resolution {
    fn from(side: KeepSide) -> Self {
        match side {
            KeepSide::Local => Self::KeepLocal,
            KeepSide::Server => Self::KeepServer,
        }
    }
}
