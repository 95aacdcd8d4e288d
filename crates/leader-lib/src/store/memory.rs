//! In-process store
//!
//! Backs the standalone daemon and every test. Writes that leave a value
//! unchanged produce no watch event, matching how the desired-state writer
//! avoids re-triggering its own watches.

use super::{key_under, KeyValueStore, WatchAction, WatchEvent};
use crate::error::{LeaderError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

struct Watcher {
    prefix: String,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

/// Store kept entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    values: DashMap<String, String>,
    watchers: DashMap<u64, Watcher>,
    next_watch_id: AtomicU64,
    /// Prefixes below which every write fails, for exercising error paths
    failing_prefixes: DashMap<String, String>,
    /// Held across apply and notify so watchers see writes in applied order
    write_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous read for assertions
    pub fn value(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.value().clone())
    }

    /// Synchronous child listing for assertions
    pub fn child_names(&self, prefix: &str) -> BTreeSet<String> {
        let prefix = prefix.trim_end_matches('/');
        self.values
            .iter()
            .filter_map(|entry| {
                entry
                    .key()
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .and_then(|rest| rest.split('/').next())
                    .filter(|child| !child.is_empty())
                    .map(str::to_string)
            })
            .collect()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Make every write at or below `prefix` fail with `message`
    pub fn fail_writes_under(&self, prefix: impl Into<String>, message: impl Into<String>) {
        self.failing_prefixes.insert(prefix.into(), message.into());
    }

    /// Stop injecting write failures
    pub fn clear_failures(&self) {
        self.failing_prefixes.clear();
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        // The guarded state is (), so a poisoned lock is still usable
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self, key: &str) -> Result<()> {
        for entry in self.failing_prefixes.iter() {
            if key_under(key, entry.key()) {
                return Err(LeaderError::store(key, entry.value()));
            }
        }
        Ok(())
    }

    fn notify(&self, event: WatchEvent) {
        let mut closed = Vec::new();
        for watcher in self.watchers.iter() {
            if key_under(&event.key, &watcher.prefix) && watcher.tx.send(event.clone()).is_err() {
                closed.push(*watcher.key());
            }
        }
        for id in closed {
            debug!(watch_id = id, "Dropping closed watcher");
            self.watchers.remove(&id);
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable(key)?;
        let _guard = self.lock_writes();

        let previous = self.values.insert(key.to_string(), value.to_string());
        let action = match previous.as_deref() {
            Some(old) if old == value => return Ok(()),
            Some(_) => WatchAction::Update,
            None => WatchAction::Create,
        };
        self.notify(WatchEvent::new(action, key, Some(value.to_string())));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_writable(key)?;
        let _guard = self.lock_writes();

        let doomed: Vec<String> = self
            .values
            .iter()
            .filter(|entry| key_under(entry.key(), key))
            .map(|entry| entry.key().clone())
            .collect();
        for doomed_key in doomed {
            if self.values.remove(&doomed_key).is_some() {
                self.notify(WatchEvent::new(WatchAction::Delete, doomed_key, None));
            }
        }
        Ok(())
    }

    async fn list_children(&self, prefix: &str) -> Result<BTreeSet<String>> {
        Ok(self.child_names(prefix))
    }

    async fn watch(&self, prefix: &str) -> Result<mpsc::UnboundedReceiver<WatchEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_watch_id.fetch_add(1, Ordering::SeqCst);
        self.watchers.insert(
            id,
            Watcher {
                prefix: prefix.trim_end_matches('/').to_string(),
                tx,
            },
        );
        debug!(watch_id = id, prefix = %prefix, "Registered watch");
        Ok(rx)
    }
}
