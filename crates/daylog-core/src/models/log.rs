//! Log records on both sides of the sync boundary

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::LogDate;
use crate::hash::{content_hash, EMPTY_CONTENT_HASH};

/// One point in a log's edit history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionNode {
    pub content_hash: String,
    pub parent_hash: Option<String>,
}

impl VersionNode {
    pub fn new(content_hash: impl Into<String>, parent_hash: Option<&str>) -> Self {
        Self {
            content_hash: content_hash.into(),
            parent_hash: parent_hash.map(str::to_string),
        }
    }
}

/// The device-local copy of one day's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalLogRecord {
    pub content: String,
    pub content_hash: String,
    pub parent_hash: Option<String>,
    pub local_updated_at: DateTime<Utc>,
}

impl LocalLogRecord {
    /// Record synthesized for a date that has never been written.
    #[must_use]
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            content: String::new(),
            content_hash: EMPTY_CONTENT_HASH.to_string(),
            parent_hash: None,
            local_updated_at: now,
        }
    }

    /// Record whose history is unknown (legacy data, fresh import lineage).
    #[must_use]
    pub fn detached(content: impl Into<String>, local_updated_at: DateTime<Utc>) -> Self {
        let content = content.into();
        Self {
            content_hash: content_hash(&content),
            content,
            parent_hash: None,
            local_updated_at,
        }
    }

    #[must_use]
    pub fn version_node(&self) -> VersionNode {
        VersionNode {
            content_hash: self.content_hash.clone(),
            parent_hash: self.parent_hash.clone(),
        }
    }
}

/// The server's copy of one day's log for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerLogRecord {
    pub user_id: String,
    pub date: LogDate,
    pub content: String,
    pub content_hash: String,
    pub parent_hash: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Starts at 1 and grows by exactly 1 per overwrite.
    pub version: i64,
}

impl ServerLogRecord {
    #[must_use]
    pub fn version_node(&self) -> VersionNode {
        VersionNode {
            content_hash: self.content_hash.clone(),
            parent_hash: self.parent_hash.clone(),
        }
    }
}

/// Snapshot of a server record captured right before it was overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub user_id: String,
    /// `date#backedUpAt`, so prefix listings come back chronologically.
    pub backup_id: String,
    pub date: LogDate,
    pub content: String,
    pub original_updated_at: DateTime<Utc>,
    pub original_version: i64,
    pub backed_up_at: DateTime<Utc>,
}

impl BackupRecord {
    #[must_use]
    pub fn backup_id_for(date: LogDate, backed_up_at: DateTime<Utc>) -> String {
        format!(
            "{date}#{}",
            backed_up_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

/// Body of a single log upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPush {
    pub date: LogDate,
    pub content: String,
    pub content_hash: String,
    pub parent_hash: Option<String>,
}

impl LogPush {
    /// Upload for a local record as it currently stands.
    #[must_use]
    pub fn from_local(date: LogDate, record: &LocalLogRecord) -> Self {
        Self {
            date,
            content: record.content.clone(),
            content_hash: record.content_hash.clone(),
            parent_hash: record.parent_hash.clone(),
        }
    }
}

/// Sort backups newest first for history views.
pub fn sort_backups_newest_first(backups: &mut [BackupRecord]) {
    backups.sort_by(|a, b| b.backed_up_at.cmp(&a.backed_up_at));
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn empty_record_uses_baseline_hash() {
        let record = LocalLogRecord::empty(Utc::now());
        assert_eq!(record.content, "");
        assert_eq!(record.content_hash, content_hash(""));
        assert!(record.parent_hash.is_none());
    }

    #[test]
    fn local_record_serializes_with_camel_case_keys() {
        let at = Utc.with_ymd_and_hms(2026, 1, 12, 0, 0, 0).unwrap();
        let record = LocalLogRecord::detached("hello", at);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["content"], "hello");
        assert_eq!(value["contentHash"], content_hash("hello"));
        assert!(value["parentHash"].is_null());
        assert_eq!(value["localUpdatedAt"], "2026-01-12T00:00:00Z");
    }

    #[test]
    fn backup_id_embeds_date_and_timestamp() {
        let date: LogDate = "2026-01-12".parse().unwrap();
        let at = Utc.with_ymd_and_hms(2026, 1, 12, 9, 30, 0).unwrap();
        assert_eq!(
            BackupRecord::backup_id_for(date, at),
            "2026-01-12#2026-01-12T09:30:00.000Z"
        );
    }

    #[test]
    fn push_body_keeps_explicit_null_parent() {
        let push = LogPush {
            date: "2026-01-12".parse().unwrap(),
            content: "x".to_string(),
            content_hash: content_hash("x"),
            parent_hash: None,
        };
        let json = serde_json::to_string(&push).unwrap();
        assert!(json.contains("\"parentHash\":null"));
    }
}
