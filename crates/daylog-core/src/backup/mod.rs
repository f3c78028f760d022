//! Export and import of a whole local dataset as a portable bundle.

mod normalize;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use normalize::{sanitize_sound_settings, unwrap_storage_wrapper};

use crate::error::{Error, Result};
use crate::hash::content_hash;
use crate::models::{is_log_key, sort_backups_newest_first, BackupRecord, LogDate, LogPush};
use crate::remote::LogRemote;
use crate::storage::{KeyValueStore, LocalVersionStore, ParentLink};
use crate::util::now_utc;

pub const BACKUP_VERSION: u32 = 1;

/// Non-log keys carried in a bundle.
pub const SETTING_KEYS: [&str; 3] = ["soundSettings", "targetPace", "app-theme"];

const SOUND_SETTINGS_KEY: &str = "soundSettings";

/// On-disk backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupBundle {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub logs: BTreeMap<LogDate, String>,
    pub settings: BTreeMap<String, String>,
}

impl BackupBundle {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Where an export came from; decides the suggested file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    Local,
    Server,
}

/// `daylog-backup-2026-01-12.json` / `daylog-server-backup-2026-01-12.json`
#[must_use]
pub fn suggested_file_name(kind: BackupKind, date: LogDate) -> String {
    match kind {
        BackupKind::Local => format!("daylog-backup-{date}.json"),
        BackupKind::Server => format!("daylog-server-backup-{date}.json"),
    }
}

/// Outcome of [`BackupService::import_backup`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub applied_logs: usize,
    pub applied_settings: usize,
    /// Logs were bulk-pushed to the server before being written locally.
    pub synced_to_server: bool,
    /// Dates or setting keys that did not read back as written.
    pub failed: Vec<String>,
}

/// Validated contents of a backup file, not yet applied.
#[derive(Debug, Default)]
struct ParsedBackup {
    logs: BTreeMap<LogDate, String>,
    settings: BTreeMap<String, String>,
}

pub struct BackupService<S, R> {
    store: Arc<LocalVersionStore<S>>,
    remote: Arc<R>,
}

impl<S, R> BackupService<S, R>
where
    S: KeyValueStore + 'static,
    R: LogRemote,
{
    pub fn new(store: Arc<LocalVersionStore<S>>, remote: Arc<R>) -> Self {
        Self { store, remote }
    }

    /// Bundle every non-empty local log plus the allow-listed settings.
    pub fn create_backup(&self) -> Result<BackupBundle> {
        let mut logs = BTreeMap::new();
        for date in self.store.log_dates()? {
            let content = unwrap_storage_wrapper(&self.store.load(date).content);
            if !content.is_empty() {
                logs.insert(date, content);
            }
        }

        let mut settings = BTreeMap::new();
        for key in SETTING_KEYS {
            if let Some(value) = self.store.setting(key).filter(|value| !value.is_empty()) {
                settings.insert(key.to_string(), clean_setting(key, &value));
            }
        }

        tracing::info!(logs = logs.len(), settings = settings.len(), "Created backup");
        Ok(BackupBundle {
            version: BACKUP_VERSION,
            exported_at: now_utc(),
            logs,
            settings,
        })
    }

    /// Replace every local log with the contents of a backup file.
    ///
    /// The file is fully validated first. When signed in, the logs are
    /// pushed to the server as new lineages before anything local changes;
    /// a failed push aborts the import.
    pub async fn import_backup(&self, raw: &str) -> Result<ImportReport> {
        let parsed = parse_backup(raw)?;

        let mut server_hashes = BTreeMap::new();
        let synced_to_server = self.remote.is_authenticated() && !parsed.logs.is_empty();
        if synced_to_server {
            let pushes: Vec<LogPush> = parsed
                .logs
                .iter()
                .map(|(date, content)| LogPush {
                    date: *date,
                    content: content.clone(),
                    content_hash: content_hash(content),
                    parent_hash: None,
                })
                .collect();
            let stored = self.remote.push_bulk(&pushes).await?;
            for record in stored {
                server_hashes.insert(record.date, record.content_hash);
            }
            tracing::info!(logs = pushes.len(), "Pushed imported logs to server");
        }

        self.store.clear_all_logs()?;

        let mut report = ImportReport {
            synced_to_server,
            ..ImportReport::default()
        };
        for (date, content) in &parsed.logs {
            let parent = server_hashes.get(date).cloned();
            self.store
                .save(*date, content, ParentLink::Explicit(parent));
        }
        for (key, value) in &parsed.settings {
            match self.store.set_setting(key, value) {
                Ok(()) => report.applied_settings += 1,
                Err(error) => {
                    tracing::warn!(key, "Failed to apply imported setting: {}", error);
                    report.failed.push(key.clone());
                }
            }
        }

        for (date, content) in &parsed.logs {
            if self.store.load(*date).content == *content {
                report.applied_logs += 1;
            } else {
                tracing::warn!(%date, "Imported log did not read back");
                report.failed.push(date.to_string());
            }
        }

        tracing::info!(
            applied_logs = report.applied_logs,
            applied_settings = report.applied_settings,
            failed = report.failed.len(),
            synced_to_server,
            "Imported backup"
        );
        Ok(report)
    }

    /// Bundle of everything the server holds; settings stay empty.
    pub async fn export_server_backup(&self) -> Result<BackupBundle> {
        let logs = self
            .remote
            .fetch_all()
            .await?
            .into_iter()
            .map(|record| (record.date, unwrap_storage_wrapper(&record.content)))
            .filter(|(_, content)| !content.is_empty())
            .collect();
        Ok(BackupBundle {
            version: BACKUP_VERSION,
            exported_at: now_utc(),
            logs,
            settings: BTreeMap::new(),
        })
    }

    /// Server-side snapshots for one date, newest first.
    pub async fn log_history(&self, date: LogDate) -> Result<Vec<BackupRecord>> {
        let mut backups = self.remote.fetch_backups(date).await?;
        sort_backups_newest_first(&mut backups);
        Ok(backups)
    }
}

fn clean_setting(key: &str, value: &str) -> String {
    if key == SOUND_SETTINGS_KEY {
        sanitize_sound_settings(value)
    } else {
        value.to_string()
    }
}

/// Accepts `{logs: {...}, settings: {...}}` or a flat key/value dump.
fn parse_backup(raw: &str) -> Result<ParsedBackup> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|error| Error::InvalidBackup(format!("not valid JSON: {error}")))?;
    let Value::Object(root) = value else {
        return Err(Error::InvalidBackup(
            "backup must be a JSON object".to_string(),
        ));
    };

    let mut parsed = ParsedBackup::default();
    match (root.get("logs"), root.get("settings")) {
        (Some(Value::Object(logs)), Some(Value::Object(settings))) => {
            collect_entries(logs, &mut parsed, EntryFilter::LogsOnly);
            collect_entries(settings, &mut parsed, EntryFilter::SettingsOnly);
        }
        _ => collect_entries(&root, &mut parsed, EntryFilter::Any),
    }

    if parsed.logs.is_empty() && parsed.settings.is_empty() {
        return Err(Error::InvalidBackup(
            "no logs or settings found in backup".to_string(),
        ));
    }
    Ok(parsed)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntryFilter {
    LogsOnly,
    SettingsOnly,
    Any,
}

fn collect_entries(entries: &Map<String, Value>, parsed: &mut ParsedBackup, filter: EntryFilter) {
    for (key, value) in entries {
        if is_log_key(key) && filter != EntryFilter::SettingsOnly {
            let Ok(date) = key.parse::<LogDate>() else {
                tracing::warn!(key, "Skipping backup entry with impossible date");
                continue;
            };
            let content = unwrap_storage_wrapper(&normalize::value_to_text(value));
            if !content.is_empty() {
                parsed.logs.insert(date, content);
            }
        } else if SETTING_KEYS.contains(&key.as_str()) && filter != EntryFilter::LogsOnly {
            let text = normalize::value_to_text(value);
            if !text.is_empty() {
                parsed.settings.insert(key.clone(), clean_setting(key, &text));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::storage::MemoryStore;
    use crate::testing::{date, memory_store, FakeRemote};

    type Service = BackupService<MemoryStore, FakeRemote>;

    fn service(remote: FakeRemote) -> (Service, Arc<LocalVersionStore<MemoryStore>>, Arc<FakeRemote>) {
        let store = memory_store();
        let remote = Arc::new(remote);
        (BackupService::new(store.clone(), remote.clone()), store, remote)
    }

    #[test]
    fn create_backup_cleans_and_filters() {
        let (backups, store, _remote) = service(FakeRemote::signed_out());
        let wrapped = json!({ "content": "09:00 start", "contentHash": "x" }).to_string();
        store.save(date("2026-01-13"), &wrapped, ParentLink::Derive);
        store.save(date("2026-01-11"), "first", ParentLink::Derive);
        store.save(date("2026-01-12"), "", ParentLink::Derive);
        store.set_setting("targetPace", "5:30").unwrap();
        store.set_setting("token", "secret").unwrap();
        store
            .set_setting(
                "soundSettings",
                &json!({ "selectedSound": "custom", "customSoundData": "AAAA" }).to_string(),
            )
            .unwrap();

        let bundle = backups.create_backup().unwrap();

        assert_eq!(bundle.version, 1);
        let dates: Vec<String> = bundle.logs.keys().map(ToString::to_string).collect();
        assert_eq!(dates, vec!["2026-01-11", "2026-01-13"]);
        assert_eq!(bundle.logs[&date("2026-01-13")], "09:00 start");
        assert_eq!(bundle.settings.len(), 2);
        assert!(!bundle.settings.contains_key("token"));
        let sound: Value = serde_json::from_str(&bundle.settings["soundSettings"]).unwrap();
        assert_eq!(sound["selectedSound"], "beep");
        assert!(sound["customSoundData"].is_null());
    }

    #[test]
    fn bundle_serializes_in_file_format() {
        let (backups, store, _remote) = service(FakeRemote::signed_out());
        store.save(date("2026-01-11"), "first", ParentLink::Derive);
        let value: Value =
            serde_json::from_str(&backups.create_backup().unwrap().to_json_pretty().unwrap())
                .unwrap();
        assert_eq!(value["version"], 1);
        assert!(value["exportedAt"].is_string());
        assert_eq!(value["logs"]["2026-01-11"], "first");
        assert!(value["settings"].is_object());
    }

    #[tokio::test]
    async fn offline_import_replaces_local_logs() {
        let (backups, store, remote) = service(FakeRemote::signed_out());
        store.save(date("2026-01-01"), "stale", ParentLink::Derive);
        store.set_setting("token", "keep-me").unwrap();
        let file = json!({
            "version": 1,
            "exportedAt": "2026-01-20T00:00:00.000Z",
            "logs": { "2026-01-11": "first", "2026-01-12": "" },
            "settings": { "targetPace": "5:30", "unknown": "x" }
        })
        .to_string();

        let report = backups.import_backup(&file).await.unwrap();

        assert_eq!(
            report,
            ImportReport {
                applied_logs: 1,
                applied_settings: 1,
                synced_to_server: false,
                failed: vec![],
            }
        );
        assert_eq!(store.log_dates().unwrap(), vec![date("2026-01-11")]);
        let record = store.load(date("2026-01-11"));
        assert_eq!(record.content, "first");
        assert_eq!(record.parent_hash, None);
        assert_eq!(store.setting("targetPace").as_deref(), Some("5:30"));
        assert_eq!(store.setting("token").as_deref(), Some("keep-me"));
        assert!(remote.pushes().is_empty());
    }

    #[tokio::test]
    async fn signed_in_import_pushes_new_lineage_first() {
        let (backups, store, remote) = service(FakeRemote::new());
        remote.seed(date("2026-01-11"), "server copy", None);
        let file = json!({
            "logs": { "2026-01-11": "first", "2026-01-12": "second" },
            "settings": {}
        })
        .to_string();

        let report = backups.import_backup(&file).await.unwrap();

        assert!(report.synced_to_server);
        assert_eq!(report.applied_logs, 2);
        let pushes = remote.pushes();
        assert_eq!(pushes.len(), 2);
        assert!(pushes.iter().all(|push| push.parent_hash.is_none()));
        assert_eq!(remote.backup_count(), 1);
        assert_eq!(
            store.load(date("2026-01-12")).parent_hash,
            Some(content_hash("second"))
        );
    }

    #[tokio::test]
    async fn failed_push_leaves_local_data_untouched() {
        let (backups, store, remote) = service(FakeRemote::new());
        remote.set_fail_pushes(true);
        store.save(date("2026-01-01"), "keep", ParentLink::Derive);
        let file = json!({ "logs": { "2026-01-11": "first" }, "settings": {} }).to_string();

        let err = backups.import_backup(&file).await.unwrap_err();

        assert!(matches!(err, Error::Remote(_)));
        assert_eq!(store.log_dates().unwrap(), vec![date("2026-01-01")]);
        assert_eq!(store.load(date("2026-01-01")).content, "keep");
    }

    #[tokio::test]
    async fn legacy_flat_dump_is_accepted() {
        let (backups, store, _remote) = service(FakeRemote::signed_out());
        let wrapped = json!({ "content": "legacy", "localUpdatedAt": 1 }).to_string();
        let file = json!({
            "2026-01-11": wrapped,
            "app-theme": "dark",
            "token": "ignored"
        })
        .to_string();

        let report = backups.import_backup(&file).await.unwrap();

        assert_eq!(report.applied_logs, 1);
        assert_eq!(report.applied_settings, 1);
        assert_eq!(store.load(date("2026-01-11")).content, "legacy");
        assert_eq!(store.setting("app-theme").as_deref(), Some("dark"));
        assert!(store.setting("token").is_none());
    }

    #[tokio::test]
    async fn unusable_files_are_rejected_before_any_change() {
        let (backups, store, _remote) = service(FakeRemote::signed_out());
        store.save(date("2026-01-01"), "keep", ParentLink::Derive);

        for file in ["not json", "[1, 2]", r#"{"logs": {}, "settings": {}}"#, r#"{"foo": "bar"}"#] {
            let err = backups.import_backup(file).await.unwrap_err();
            assert!(matches!(err, Error::InvalidBackup(_)), "{file}");
        }
        assert_eq!(store.load(date("2026-01-01")).content, "keep");
    }

    #[tokio::test]
    async fn import_then_export_preserves_logs() {
        let (backups, _store, _remote) = service(FakeRemote::signed_out());
        let file = json!({
            "logs": { "2026-01-12": "b", "2026-01-11": "a" },
            "settings": { "targetPace": "6:00" }
        })
        .to_string();
        backups.import_backup(&file).await.unwrap();

        let bundle = backups.create_backup().unwrap();
        let expected: BTreeMap<LogDate, String> = [
            (date("2026-01-11"), "a".to_string()),
            (date("2026-01-12"), "b".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(bundle.logs, expected);
        assert_eq!(bundle.settings["targetPace"], "6:00");
    }

    #[tokio::test]
    async fn server_export_and_history() {
        let (backups, _store, remote) = service(FakeRemote::new());
        let day = date("2026-01-12");
        remote.seed(day, "v1", None);
        remote.seed(day, "v2", Some(&content_hash("v1")));
        remote.seed(day, "v3", Some(&content_hash("v2")));
        remote.seed(date("2026-01-13"), "", None);

        let bundle = backups.export_server_backup().await.unwrap();
        assert_eq!(bundle.logs.len(), 1);
        assert_eq!(bundle.logs[&day], "v3");
        assert!(bundle.settings.is_empty());

        let history = backups.log_history(day).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].backed_up_at >= history[1].backed_up_at);
        assert_eq!(history.iter().map(|b| b.original_version).max(), Some(2));
    }

    #[tokio::test]
    async fn server_export_requires_session() {
        let (backups, _store, _remote) = service(FakeRemote::signed_out());
        let err = backups.export_server_backup().await.unwrap_err();
        assert!(matches!(err, Error::Remote(ref remote) if remote.is_auth()));
    }

    #[test]
    fn file_names_carry_kind_and_date() {
        let day = date("2026-01-12");
        assert_eq!(
            suggested_file_name(BackupKind::Local, day),
            "daylog-backup-2026-01-12.json"
        );
        assert_eq!(
            suggested_file_name(BackupKind::Server, day),
            "daylog-server-backup-2026-01-12.json"
        );
    }
}
