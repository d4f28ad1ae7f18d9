//! Per-prefix local cache over a remote store.
//!
//! # Responsibilities
//! - Serve reads from memory, falling back to one remote point read on miss
//! - Remember confirmed-absent keys (negative cache)
//! - Bulk preload a whole prefix with a single range read
//! - Apply watch events and fire change hooks
//!
//! # Cache States
//! ```text
//! (no entry)  → nothing known, nobody listening
//! Unloaded    → hooks registered before the first read
//! Absent      → confirmed missing (negative cache) or deleted
//! Present(v)  → cached value
//! ```
//!
//! # Design Decisions
//! - Deletes clear the value but never fire hooks and never drop the entry
//! - A remote fill never overwrites a state a watch event already set
//! - Hooks run after the write lock is released

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::driver::hook::{self, Hook};
use crate::error::{ConfigError, Result};
use crate::observability::metrics;
use crate::store::{EventKind, KvStore, Observer, WatchEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CacheState {
    Unloaded,
    Absent,
    Present(Bytes),
}

struct Entry {
    state: CacheState,
    hooks: Vec<Hook>,
}

impl Entry {
    fn with_state(state: CacheState) -> Self {
        Self {
            state,
            hooks: Vec::new(),
        }
    }
}

/// Cache of every key under one prefix.
pub struct Kv {
    prefix: String,
    entries: RwLock<HashMap<String, Entry>>,
    store: Arc<dyn KvStore>,
}

impl Kv {
    pub fn new(prefix: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: RwLock::new(HashMap::new()),
            store,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of cached entries, including negative and hook-only ones.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load every key under the prefix in one range read.
    ///
    /// New keys are added and changed values refreshed; entries the range
    /// does not mention are left as they are.
    pub async fn preload(&self) -> Result<()> {
        let kvs = self.store.get_prefix(&self.prefix).await?;
        metrics::record_remote_read("range");

        let mut entries = self.entries.write();
        for kv in kvs {
            let Some(key) = kv.key.strip_prefix(self.prefix.as_str()) else {
                continue;
            };

            match entries.get_mut(key) {
                Some(entry) => {
                    if entry.state != CacheState::Present(kv.value.clone()) {
                        entry.state = CacheState::Present(kv.value);
                    }
                }
                None => {
                    entries.insert(key.to_string(), Entry::with_state(CacheState::Present(kv.value)));
                }
            }
        }

        tracing::debug!(prefix = %self.prefix, entries = entries.len(), "Preloaded prefix");
        Ok(())
    }

    /// Register a hook for `key`. Keys need not be cached yet.
    ///
    /// Deleting the key does not fire the hook.
    pub fn on_key_change(&self, key: &str, hook: Hook) -> bool {
        let key = self.cache_key(key).to_string();
        self.entries
            .write()
            .entry(key)
            .or_insert_with(|| Entry::with_state(CacheState::Unloaded))
            .hooks
            .push(hook);
        true
    }

    /// Value of `key`, from cache or one remote read.
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let cache_key = self.cache_key(key);
        if let Some(cached) = self.lookup(cache_key) {
            return cached;
        }

        match self.get_no_cache(key).await {
            Ok(value) => {
                self.fill(cache_key, CacheState::Present(value.clone()));
                Ok(value)
            }
            Err(ConfigError::NotFound) => {
                self.fill(cache_key, CacheState::Absent);
                Err(ConfigError::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_string(&self, key: &str) -> Result<String> {
        let value = self.get(key).await?;
        Ok(String::from_utf8_lossy(&value).into_owned())
    }

    /// Remote point read that bypasses and does not touch the cache.
    pub async fn get_no_cache(&self, key: &str) -> Result<Bytes> {
        let remote_key = self.remote_key(key);
        let value = self.store.get(&remote_key).await?;
        metrics::record_remote_read("point");
        value.ok_or(ConfigError::NotFound)
    }

    fn lookup(&self, key: &str) -> Option<Result<Bytes>> {
        let entries = self.entries.read();
        match &entries.get(key)?.state {
            CacheState::Present(value) => {
                metrics::record_cache_hit("present");
                Some(Ok(value.clone()))
            }
            CacheState::Absent => {
                metrics::record_cache_hit("absent");
                Some(Err(ConfigError::NotFound))
            }
            CacheState::Unloaded => None,
        }
    }

    fn fill(&self, key: &str, state: CacheState) {
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) if entry.state == CacheState::Unloaded => entry.state = state,
            Some(_) => {}
            None => {
                entries.insert(key.to_string(), Entry::with_state(state));
            }
        }
    }

    /// Key without the prefix.
    fn cache_key<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.prefix.as_str()).unwrap_or(key)
    }

    /// Key with the prefix.
    fn remote_key(&self, key: &str) -> String {
        if key.starts_with(self.prefix.as_str()) {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }
}

impl Observer for Kv {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn handle(&self, event: &WatchEvent) -> Result<()> {
        let Some(key) = event.key.strip_prefix(self.prefix.as_str()) else {
            return Ok(());
        };

        match event.kind {
            EventKind::Put => {
                let hooks = {
                    let mut entries = self.entries.write();
                    let Some(entry) = entries.get_mut(key) else {
                        return Ok(());
                    };
                    if entry.state == CacheState::Present(event.value.clone()) {
                        return Ok(());
                    }
                    entry.state = CacheState::Present(event.value.clone());
                    entry.hooks.clone()
                };

                tracing::debug!(prefix = %self.prefix, key, "Key changed");
                hook::dispatch(&hooks, &event.value, key, "store");
            }
            EventKind::Delete => {
                if let Some(entry) = self.entries.write().get_mut(key) {
                    entry.state = CacheState::Absent;
                }
                tracing::debug!(prefix = %self.prefix, key, "Key deleted");
            }
        }

        Ok(())
    }
}
