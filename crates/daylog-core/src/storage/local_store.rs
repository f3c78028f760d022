//! Versioned log records layered over a [`KeyValueStore`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use super::KeyValueStore;
use crate::error::Result;
use crate::hash::content_hash;
use crate::models::{is_log_key, LocalLogRecord, LogDate, ServerLogRecord};
use crate::util::{now_utc, short_hash};

/// How `save` links the new version to its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParentLink {
    /// Point at the previous hash when the content changed, otherwise keep
    /// the existing parent.
    #[default]
    Derive,
    /// Use this parent verbatim, including `None`.
    Explicit(Option<String>),
}

/// Per-date log records with parent-pointer history.
///
/// Storage faults are logged and swallowed: reads fall back to an empty
/// record and writes still hand back the record that would have been stored.
pub struct LocalVersionStore<S> {
    store: Arc<S>,
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore> LocalVersionStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// The raw key/value backend, shared with the token and settings users.
    pub fn backing_store(&self) -> &Arc<S> {
        &self.store
    }

    /// Current record for `date`, or a fresh empty one.
    pub fn load(&self, date: LogDate) -> LocalLogRecord {
        self.load_key(&date.key())
    }

    pub(crate) fn load_key(&self, key: &str) -> LocalLogRecord {
        match self.store.get(key) {
            Ok(Some(raw)) => decode_record(&raw),
            Ok(None) => LocalLogRecord::empty(now_utc()),
            Err(err) => {
                tracing::warn!(key, error = %err, "Failed to read local log; using empty record");
                LocalLogRecord::empty(now_utc())
            }
        }
    }

    /// Persist `content` for `date` and return the resulting record.
    pub fn save(&self, date: LogDate, content: &str, parent: ParentLink) -> LocalLogRecord {
        self.save_key(&date.key(), content, parent)
    }

    pub(crate) fn save_key(&self, key: &str, content: &str, parent: ParentLink) -> LocalLogRecord {
        let _guard = self.lock();
        let existing = self.load_key(key);
        let new_hash = content_hash(content);
        let parent_hash = match parent {
            ParentLink::Explicit(parent_hash) => parent_hash,
            ParentLink::Derive if new_hash != existing.content_hash => Some(existing.content_hash),
            ParentLink::Derive => existing.parent_hash,
        };
        let record = LocalLogRecord {
            content: content.to_string(),
            content_hash: new_hash,
            parent_hash,
            local_updated_at: now_utc(),
        };
        self.write(key, &record);
        record
    }

    /// Take over the server's copy: its content, parent link and timestamp.
    pub fn adopt_server(&self, server: &ServerLogRecord) -> LocalLogRecord {
        let _guard = self.lock();
        let record = LocalLogRecord {
            content: server.content.clone(),
            content_hash: content_hash(&server.content),
            parent_hash: server.parent_hash.clone(),
            local_updated_at: server.updated_at,
        };
        self.write(&server.date.key(), &record);
        record
    }

    /// Record a successful push of `pushed_hash`.
    ///
    /// The parent becomes `server_hash` only while the local content is still
    /// the pushed content; a newer local edit keeps its own link and `None`
    /// is returned.
    pub fn confirm_synced(
        &self,
        date: LogDate,
        pushed_hash: &str,
        server_hash: &str,
    ) -> Option<LocalLogRecord> {
        let _guard = self.lock();
        let key = date.key();
        let mut record = self.load_key(&key);
        if record.content_hash != pushed_hash {
            tracing::debug!(
                %date,
                pushed = short_hash(Some(pushed_hash)),
                local = short_hash(Some(&record.content_hash)),
                "Local log moved on during push; keeping its parent"
            );
            return None;
        }
        record.parent_hash = Some(server_hash.to_string());
        record.local_updated_at = now_utc();
        self.write(&key, &record);
        Some(record)
    }

    /// Dates that currently have a stored record, ascending.
    pub fn log_dates(&self) -> Result<Vec<LogDate>> {
        Ok(self
            .store
            .keys()?
            .into_iter()
            .filter(|key| is_log_key(key))
            .filter_map(|key| key.parse().ok())
            .collect())
    }

    /// Delete every date-keyed record, leaving settings and the token alone.
    pub fn clear_all_logs(&self) -> Result<usize> {
        let _guard = self.lock();
        let mut removed = 0;
        for key in self.store.keys()? {
            if is_log_key(&key) {
                self.store.remove(&key)?;
                removed += 1;
            }
        }
        tracing::info!(removed, "Cleared local logs");
        Ok(removed)
    }

    /// Raw value of a non-log key.
    pub fn setting(&self, key: &str) -> Option<String> {
        self.store.get(key).unwrap_or_else(|err| {
            tracing::warn!(key, error = %err, "Failed to read setting");
            None
        })
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.store.set(key, value)
    }

    fn write(&self, key: &str, record: &LocalLogRecord) {
        let result = serde_json::to_string(record)
            .map_err(crate::error::Error::from)
            .and_then(|raw| self.store.set(key, &raw));
        if let Err(err) = result {
            tracing::warn!(key, error = %err, "Failed to persist local log");
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Interpret a stored value, migrating legacy shapes.
///
/// Typed records are returned as-is. A `{content, localUpdatedAt}` object
/// keeps its content and timestamp. Anything else is treated as raw text.
/// Migrated records always have a `None` parent.
fn decode_record(raw: &str) -> LocalLogRecord {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return LocalLogRecord::detached(raw, now_utc());
    };
    let Value::Object(map) = &value else {
        return LocalLogRecord::detached(raw, now_utc());
    };
    if let Ok(record) = serde_json::from_value::<LocalLogRecord>(value.clone()) {
        return record;
    }
    match map.get("content") {
        Some(Value::String(content)) => {
            let updated_at = map
                .get("localUpdatedAt")
                .and_then(parse_timestamp)
                .unwrap_or_else(now_utc);
            LocalLogRecord::detached(content.as_str(), updated_at)
        }
        _ => LocalLogRecord::detached(raw, now_utc()),
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|at| at.with_timezone(&Utc)),
        Value::Number(millis) => Utc.timestamp_millis_opt(millis.as_i64()?).single(),
        _ => None,
    }
}
