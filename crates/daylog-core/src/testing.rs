//! In-process stand-ins shared by unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::hash::content_hash;
use crate::models::{BackupRecord, LogDate, LogPush, ServerLogRecord};
use crate::remote::{LogRemote, RemoteError, RemoteResult};
use crate::storage::{LocalVersionStore, MemoryStore};
use crate::util::now_utc;

pub(crate) const USER_ID: &str = "user-1";

pub(crate) fn date(value: &str) -> LogDate {
    value.parse().unwrap()
}

pub(crate) fn memory_store() -> Arc<LocalVersionStore<MemoryStore>> {
    Arc::new(LocalVersionStore::new(Arc::new(MemoryStore::new())))
}

#[derive(Default)]
struct FakeServer {
    logs: BTreeMap<LogDate, ServerLogRecord>,
    backups: Vec<BackupRecord>,
    pushes: Vec<LogPush>,
}

impl FakeServer {
    fn put(&mut self, push: &LogPush) -> ServerLogRecord {
        let now = now_utc();
        let version = match self.logs.get(&push.date) {
            Some(prior) => {
                self.backups.push(BackupRecord {
                    user_id: USER_ID.to_string(),
                    backup_id: BackupRecord::backup_id_for(push.date, now),
                    date: push.date,
                    content: prior.content.clone(),
                    original_updated_at: prior.updated_at,
                    original_version: prior.version,
                    backed_up_at: now,
                });
                prior.version + 1
            }
            None => 1,
        };
        let record = ServerLogRecord {
            user_id: USER_ID.to_string(),
            date: push.date,
            content: push.content.clone(),
            content_hash: push.content_hash.clone(),
            parent_hash: push.parent_hash.clone(),
            updated_at: now,
            version,
        };
        self.logs.insert(push.date, record.clone());
        record
    }
}

/// Scriptable [`LogRemote`] with server-like overwrite semantics.
pub(crate) struct FakeRemote {
    server: Mutex<FakeServer>,
    authenticated: AtomicBool,
    fail_pushes: AtomicBool,
    fail_fetches: AtomicBool,
    fetch_delay: Mutex<Duration>,
    push_delay: Mutex<Duration>,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self {
            server: Mutex::default(),
            authenticated: AtomicBool::new(true),
            fail_pushes: AtomicBool::new(false),
            fail_fetches: AtomicBool::new(false),
            fetch_delay: Mutex::new(Duration::ZERO),
            push_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub(crate) fn signed_out() -> Self {
        let remote = Self::new();
        remote.set_authenticated(false);
        remote
    }

    pub(crate) fn set_authenticated(&self, value: bool) {
        self.authenticated.store(value, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_pushes(&self, value: bool) {
        self.fail_pushes.store(value, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_fetches(&self, value: bool) {
        self.fail_fetches.store(value, Ordering::SeqCst);
    }

    pub(crate) fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub(crate) fn set_push_delay(&self, delay: Duration) {
        *self.push_delay.lock().unwrap() = delay;
    }

    /// Store `content` server-side as if another device had pushed it.
    pub(crate) fn seed(&self, date: LogDate, content: &str, parent: Option<&str>) -> ServerLogRecord {
        let push = LogPush {
            date,
            content: content.to_string(),
            content_hash: content_hash(content),
            parent_hash: parent.map(str::to_string),
        };
        self.server.lock().unwrap().put(&push)
    }

    pub(crate) fn server_log(&self, date: LogDate) -> Option<ServerLogRecord> {
        self.server.lock().unwrap().logs.get(&date).cloned()
    }

    pub(crate) fn pushes(&self) -> Vec<LogPush> {
        self.server.lock().unwrap().pushes.clone()
    }

    pub(crate) fn pushed_contents(&self) -> Vec<String> {
        self.pushes().into_iter().map(|push| push.content).collect()
    }

    pub(crate) fn backup_count(&self) -> usize {
        self.server.lock().unwrap().backups.len()
    }

    fn check_auth(&self) -> RemoteResult<()> {
        if self.authenticated.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Unauthenticated)
        }
    }
}

impl LogRemote for FakeRemote {
    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn fetch_log(&self, date: LogDate) -> RemoteResult<Option<ServerLogRecord>> {
        self.check_auth()?;
        let delay = *self.fetch_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(RemoteError::Api("fetch failed (503)".to_string()));
        }
        Ok(self.server_log(date))
    }

    async fn push_log(&self, push: &LogPush) -> RemoteResult<ServerLogRecord> {
        self.check_auth()?;
        let delay = *self.push_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(RemoteError::Api("push failed (503)".to_string()));
        }
        let mut server = self.server.lock().unwrap();
        server.pushes.push(push.clone());
        Ok(server.put(push))
    }

    async fn push_bulk(&self, logs: &[LogPush]) -> RemoteResult<Vec<ServerLogRecord>> {
        self.check_auth()?;
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(RemoteError::Api("bulk push failed (503)".to_string()));
        }
        let mut server = self.server.lock().unwrap();
        Ok(logs
            .iter()
            .map(|push| {
                server.pushes.push(push.clone());
                server.put(push)
            })
            .collect())
    }

    async fn fetch_all(&self) -> RemoteResult<Vec<ServerLogRecord>> {
        self.check_auth()?;
        Ok(self.server.lock().unwrap().logs.values().cloned().collect())
    }

    async fn fetch_backups(&self, date: LogDate) -> RemoteResult<Vec<BackupRecord>> {
        self.check_auth()?;
        Ok(self
            .server
            .lock()
            .unwrap()
            .backups
            .iter()
            .filter(|backup| backup.date == date)
            .cloned()
            .collect())
    }
}
