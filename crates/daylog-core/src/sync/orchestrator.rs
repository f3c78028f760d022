use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use super::{Resolution, SyncConflict, SyncEvent, SyncSnapshot, SyncStatus};
use crate::conflict::{ConflictDetector, ConflictOutcome, ImmediateParentDetector};
use crate::error::{Error, Result};
use crate::hash::content_hash;
use crate::models::{LocalLogRecord, LogDate, LogPush, ServerLogRecord};
use crate::remote::{LogRemote, RemoteError};
use crate::storage::{KeyValueStore, LocalVersionStore, ParentLink};
use crate::util::short_hash;

/// Reacts to [`SyncEvent`]s for one user.
///
/// Cloning is cheap; clones share the same state and push tasks.
pub struct SyncOrchestrator<S, R, D = ImmediateParentDetector> {
    inner: Arc<Inner<S, R, D>>,
}

impl<S, R, D> Clone for SyncOrchestrator<S, R, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S, R, D> {
    store: Arc<LocalVersionStore<S>>,
    remote: Arc<R>,
    detector: D,
    debounce: Duration,
    state: Mutex<State>,
    snapshots: watch::Sender<SyncSnapshot>,
}

#[derive(Default)]
struct State {
    active: Option<LogDate>,
    keys: HashMap<LogDate, KeyState>,
}

#[derive(Default)]
struct KeyState {
    status: SyncStatus,
    conflict: Option<SyncConflict>,
    /// Closed from navigation until the server copy has been reconciled.
    gate_open: bool,
    /// Bumped by every edit; an armed push only fires if it still matches.
    generation: u64,
    deferred_push: bool,
    /// Generation whose content the server last accepted.
    pushed_generation: Option<u64>,
    last_synced_at: Option<DateTime<Utc>>,
    tasks: Vec<JoinHandle<()>>,
    push_lock: Arc<AsyncMutex<()>>,
}

impl<S, R> SyncOrchestrator<S, R>
where
    S: KeyValueStore + 'static,
    R: LogRemote,
{
    pub fn new(store: Arc<LocalVersionStore<S>>, remote: Arc<R>, debounce: Duration) -> Self {
        Self::with_detector(store, remote, debounce, ImmediateParentDetector)
    }
}

impl<S, R, D> SyncOrchestrator<S, R, D>
where
    S: KeyValueStore + 'static,
    R: LogRemote,
    D: ConflictDetector + 'static,
{
    pub fn with_detector(
        store: Arc<LocalVersionStore<S>>,
        remote: Arc<R>,
        debounce: Duration,
        detector: D,
    ) -> Self {
        let (snapshots, _) = watch::channel(SyncSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                store,
                remote,
                detector,
                debounce,
                state: Mutex::new(State::default()),
                snapshots,
            }),
        }
    }

    pub fn store(&self) -> &Arc<LocalVersionStore<S>> {
        &self.inner.store
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.inner.remote
    }

    /// Follow the active date's content, status and conflict.
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    pub fn status(&self, date: LogDate) -> SyncStatus {
        self.inner.with_key(date, |key| key.status)
    }

    pub fn conflict(&self, date: LogDate) -> Option<SyncConflict> {
        self.inner.with_key(date, |key| key.conflict.clone())
    }

    pub async fn handle(&self, event: SyncEvent) -> Result<()> {
        match event {
            SyncEvent::Edited { date, content } => {
                self.edit(date, &content);
                Ok(())
            }
            SyncEvent::Navigated(date) => {
                self.navigate(date).await;
                Ok(())
            }
            SyncEvent::LoggedIn => {
                self.login().await;
                Ok(())
            }
            SyncEvent::ResolveConflict { date, choice } => self.resolve(date, choice).await,
        }
    }

    /// Handle events in order until every sender is dropped, then flush.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<SyncEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(error) = self.handle(event).await {
                tracing::warn!("Sync event failed: {}", error);
            }
        }
        self.flush().await;
    }

    /// Persist an edit and arm a debounced push for its date.
    ///
    /// Must be called from within a tokio runtime.
    pub fn edit(&self, date: LogDate, content: &str) -> LocalLogRecord {
        let record = self.inner.store.save(date, content, ParentLink::Derive);
        let inner = Arc::clone(&self.inner);
        self.inner.with_key(date, |key| {
            if key.status != SyncStatus::Syncing {
                key.status = SyncStatus::Pending;
            }
            key.generation += 1;
            let generation = key.generation;
            key.tasks.retain(|task| !task.is_finished());
            key.tasks.push(tokio::spawn(async move {
                inner.debounced_push(date, generation).await;
            }));
        });
        tracing::debug!(%date, hash = short_hash(Some(&record.content_hash)), "Saved local edit");
        self.inner.publish();
        record
    }

    /// Make `date` the active date and reconcile it with the server.
    pub async fn navigate(&self, date: LogDate) {
        self.inner.reconcile(date).await;
    }

    /// Reconcile the active date again now that a session exists.
    pub async fn login(&self) {
        let date = self
            .inner
            .state()
            .active
            .unwrap_or_else(LogDate::today);
        self.inner.reconcile(date).await;
    }

    /// Settle a diverged conflict in favour of one side.
    ///
    /// The chosen side is pushed with the rejected side's hash as its parent.
    /// Local storage only changes once the server accepts it, so a failed
    /// push leaves both sides of the conflict intact for another try.
    pub async fn resolve(&self, date: LogDate, choice: Resolution) -> Result<()> {
        let conflict = self
            .inner
            .with_key(date, |key| key.conflict.clone())
            .ok_or_else(|| Error::NoConflict(date.to_string()))?;
        let (content, parent) = match choice {
            Resolution::KeepLocal => (conflict.local_content, conflict.server_hash),
            Resolution::KeepServer => (conflict.server_content, conflict.local_hash),
        };
        let push = LogPush {
            date,
            content_hash: content_hash(&content),
            content,
            parent_hash: Some(parent),
        };

        let lock = self.inner.push_lock(date);
        let _guard = lock.lock().await;
        let generation = self.inner.with_key(date, |key| key.generation);
        match self.inner.send(&push).await {
            Some(server) => {
                self.inner.store.save(
                    date,
                    &push.content,
                    ParentLink::Explicit(Some(server.content_hash.clone())),
                );
                self.inner.with_key(date, |key| key.conflict = None);
                self.inner.mark_synced(date, &server, generation);
                tracing::info!(%date, ?choice, "Conflict resolved");
            }
            None => {
                tracing::warn!(%date, ?choice, "Conflict resolution did not reach the server");
            }
        }
        Ok(())
    }

    /// Wait for every armed or running push to finish.
    pub async fn flush(&self) {
        loop {
            let tasks: Vec<JoinHandle<()>> = {
                let mut state = self.inner.state();
                state
                    .keys
                    .values_mut()
                    .flat_map(|key| key.tasks.drain(..))
                    .collect()
            };
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                if let Err(error) = task.await {
                    tracing::warn!("Push task ended abnormally: {}", error);
                }
            }
        }
    }
}

impl<S, R, D> Inner<S, R, D>
where
    S: KeyValueStore + 'static,
    R: LogRemote,
    D: ConflictDetector + 'static,
{
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_key<T>(&self, date: LogDate, f: impl FnOnce(&mut KeyState) -> T) -> T {
        let mut state = self.state();
        f(state.keys.entry(date).or_default())
    }

    /// Mutate one key's state, then notify observers.
    fn update<T>(&self, date: LogDate, f: impl FnOnce(&mut KeyState) -> T) -> T {
        let value = self.with_key(date, f);
        self.publish();
        value
    }

    fn publish(&self) {
        let (date, status, conflict, last_synced_at) = {
            let state = self.state();
            match state.active {
                Some(date) => {
                    let key = state.keys.get(&date);
                    (
                        Some(date),
                        key.map(|key| key.status).unwrap_or_default(),
                        key.and_then(|key| key.conflict.clone()),
                        key.and_then(|key| key.last_synced_at),
                    )
                }
                None => (None, SyncStatus::Idle, None, None),
            }
        };
        let content = date
            .map(|date| self.store.load(date).content)
            .unwrap_or_default();
        let snapshot = SyncSnapshot {
            date,
            content,
            status,
            conflict,
            last_synced_at,
        };
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    async fn debounced_push(&self, date: LogDate, generation: u64) {
        tokio::time::sleep(self.debounce).await;
        {
            let mut state = self.state();
            let key = state.keys.entry(date).or_default();
            if key.generation != generation {
                tracing::debug!(%date, generation, "Debounced push superseded");
                return;
            }
            if !key.gate_open {
                key.deferred_push = true;
                tracing::debug!(%date, "Upload gate closed; deferring push");
                return;
            }
        }
        self.push_current(date, Some(generation)).await;
    }

    fn push_lock(&self, date: LogDate) -> Arc<AsyncMutex<()>> {
        self.with_key(date, |key| Arc::clone(&key.push_lock))
    }

    /// Push whatever the local record for `date` holds right now.
    ///
    /// `armed` is the generation a debounced task was armed for. It is
    /// checked again once the push lock is held: a newer edit or a push
    /// that already carried this generation makes the task a no-op.
    /// Returns whether the server accepted the push.
    async fn push_current(&self, date: LogDate, armed: Option<u64>) -> bool {
        let lock = self.push_lock(date);
        let _guard = lock.lock().await;

        if let Some(armed) = armed {
            let stale = self.with_key(date, |key| {
                key.generation != armed || key.pushed_generation == Some(armed)
            });
            if stale {
                tracing::debug!(%date, generation = armed, "Queued push superseded");
                return false;
            }
        }

        let record = self.store.load(date);
        let generation = self.with_key(date, |key| key.generation);
        let Some(server) = self.send(&LogPush::from_local(date, &record)).await else {
            return false;
        };
        self.store
            .confirm_synced(date, &record.content_hash, &server.content_hash);
        self.mark_synced(date, &server, generation);
        true
    }

    /// Send one push; the caller holds the key's push lock.
    async fn send(&self, push: &LogPush) -> Option<ServerLogRecord> {
        let date = push.date;
        if !self.remote.is_authenticated() {
            tracing::debug!(%date, "Not signed in; keeping log local");
            self.update(date, |key| key.status = SyncStatus::Idle);
            return None;
        }

        self.update(date, |key| {
            key.status = SyncStatus::Syncing;
            key.deferred_push = false;
        });
        match self.remote.push_log(push).await {
            Ok(server) => {
                tracing::info!(
                    %date,
                    hash = short_hash(Some(&server.content_hash)),
                    version = server.version,
                    "Pushed log"
                );
                Some(server)
            }
            Err(error) => {
                self.fail(date, &error);
                None
            }
        }
    }

    /// Record that the server accepted the content of `generation`.
    fn mark_synced(&self, date: LogDate, server: &ServerLogRecord, generation: u64) {
        self.update(date, |key| {
            key.last_synced_at = Some(server.updated_at);
            key.pushed_generation = Some(generation);
            key.status = if key.generation == generation {
                SyncStatus::Synced
            } else {
                SyncStatus::Pending
            };
        });
    }

    fn fail(&self, date: LogDate, error: &RemoteError) {
        let status = if matches!(error, RemoteError::Unauthenticated) {
            SyncStatus::Idle
        } else {
            tracing::error!(%date, "Sync failed: {}", error);
            SyncStatus::Error
        };
        self.update(date, |key| key.status = status);
    }

    async fn reconcile(&self, date: LogDate) {
        {
            let mut state = self.state();
            state.active = Some(date);
            state.keys.entry(date).or_default().gate_open = false;
        }
        self.publish();

        if !self.remote.is_authenticated() {
            self.update(date, |key| key.status = SyncStatus::Idle);
            self.open_gate(date, true).await;
            return;
        }

        self.update(date, |key| key.status = SyncStatus::Syncing);
        let server = match self.remote.fetch_log(date).await {
            Ok(Some(server)) => server,
            Ok(None) => {
                tracing::info!(%date, "No server copy yet");
                self.update(date, |key| {
                    key.status = SyncStatus::Idle;
                    key.conflict = None;
                });
                self.open_gate(date, true).await;
                return;
            }
            Err(error) => {
                self.fail(date, &error);
                self.open_gate(date, false).await;
                return;
            }
        };

        // Re-read: edits may have landed while the fetch was in flight.
        let local = self.store.load(date);
        let outcome = self
            .detector
            .detect(&local.version_node(), &server.version_node());
        tracing::info!(
            %date,
            outcome = outcome.label(),
            local = short_hash(Some(&local.content_hash)),
            server = short_hash(Some(&server.content_hash)),
            "Reconciled with server"
        );

        match outcome {
            ConflictOutcome::NoConflictSame | ConflictOutcome::FastForward => {
                self.store.adopt_server(&server);
                self.update(date, |key| {
                    key.status = SyncStatus::Synced;
                    key.conflict = None;
                    key.last_synced_at = Some(server.updated_at);
                });
                self.open_gate(date, true).await;
            }
            ConflictOutcome::LocalAhead => {
                self.update(date, |key| key.conflict = None);
                self.open_gate(date, false).await;
                self.push_current(date, None).await;
            }
            ConflictOutcome::ConflictDiverged => {
                tracing::warn!(
                    %date,
                    local_parent = short_hash(local.parent_hash.as_deref()),
                    server_parent = short_hash(server.parent_hash.as_deref()),
                    "Local and server logs diverged"
                );
                self.update(date, |key| {
                    key.conflict = Some(conflict_between(&local, &server));
                    key.status = SyncStatus::Error;
                    // Pushes armed before the conflict surfaced must not
                    // overwrite the server copy.
                    key.generation += 1;
                });
                self.open_gate(date, false).await;
            }
        }
    }

    /// Open the upload gate, optionally sending a push deferred while closed.
    async fn open_gate(&self, date: LogDate, flush_deferred: bool) {
        let deferred = self.with_key(date, |key| {
            key.gate_open = true;
            std::mem::take(&mut key.deferred_push)
        });
        if deferred && flush_deferred {
            tracing::debug!(%date, "Flushing deferred push");
            self.push_current(date, None).await;
        }
    }
}

fn conflict_between(local: &LocalLogRecord, server: &ServerLogRecord) -> SyncConflict {
    SyncConflict {
        local_content: local.content.clone(),
        server_content: server.content.clone(),
        local_hash: local.content_hash.clone(),
        server_hash: server.content_hash.clone(),
        local_updated_at: local.local_updated_at,
        server_updated_at: server.updated_at,
    }
}
