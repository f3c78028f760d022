//! Data models for daylog

mod date;
mod log;

pub use date::{is_log_key, LogDate};
pub use log::{
    sort_backups_newest_first, BackupRecord, LocalLogRecord, LogPush, ServerLogRecord, VersionNode,
};
