//! Distributed key/value store seam
//!
//! The leader only ever talks to the store through [`KeyValueStore`]. Keys are
//! hierarchical, `/`-separated paths; a "child" of a prefix is the next path
//! segment of any key stored below it.

mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use tokio::sync::mpsc;

/// Kind of change delivered by a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Create,
    Update,
    Delete,
}

/// A single change observed under a watched prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub action: WatchAction,
    pub key: String,
    /// New value, `None` for deletions
    pub value: Option<String>,
}

impl WatchEvent {
    pub fn new(action: WatchAction, key: impl Into<String>, value: Option<String>) -> Self {
        Self {
            action,
            key: key.into(),
            value,
        }
    }
}

/// Hierarchical key/value store with change notification
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key does not exist
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Create or overwrite a value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key and everything stored below it
    async fn delete(&self, key: &str) -> Result<()>;

    /// Immediate child names below `prefix`; empty if nothing is stored there
    async fn list_children(&self, prefix: &str) -> Result<BTreeSet<String>>;

    /// Subscribe to changes at or below `prefix`.
    ///
    /// Events for one subscription are delivered in the order the store
    /// applied the underlying writes.
    async fn watch(&self, prefix: &str) -> Result<mpsc::UnboundedReceiver<WatchEvent>>;
}

/// Returns true if `key` equals `prefix` or lives below it
pub(crate) fn key_under(key: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    key == prefix
        || key
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}
