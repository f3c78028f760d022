//! Local key/value storage and the versioned log store built on top of it.
//!
//! Storage is string keyed: `YYYY-MM-DD` keys hold serialized
//! [`LocalLogRecord`](crate::models::LocalLogRecord)s, every other key holds
//! settings or the auth token.

mod local_store;
mod memory;
mod migrations;
mod sqlite;

pub use local_store::{LocalVersionStore, ParentLink};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;

/// Synchronous string-keyed storage backend.
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys currently stored, in ascending order.
    fn keys(&self) -> Result<Vec<String>>;
}
