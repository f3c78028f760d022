//! daylog-core - Core library for daylog
//!
//! This crate contains the offline-first sync engine shared by every daylog
//! client: content hashing, the parent-pointer version chain kept in local
//! storage, the conflict detector, the debounced sync orchestrator, and the
//! backup export/import service.

pub mod backup;
pub mod config;
pub mod conflict;
pub mod error;
pub mod hash;
pub mod models;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use backup::{BackupBundle, BackupKind, BackupService, ImportReport};
pub use config::{ClientConfig, ConfigError};
pub use conflict::{detect_conflict, ConflictDetector, ConflictOutcome, ImmediateParentDetector};
pub use error::{Error, Result};
pub use hash::{content_hash, EMPTY_CONTENT_HASH};
pub use models::{BackupRecord, LocalLogRecord, LogDate, LogPush, ServerLogRecord, VersionNode};
pub use remote::{HttpLogRemote, LogRemote, RemoteError};
pub use storage::{KeyValueStore, LocalVersionStore, MemoryStore, ParentLink, SqliteStore};
pub use sync::{Resolution, SyncConflict, SyncEvent, SyncOrchestrator, SyncSnapshot, SyncStatus};
