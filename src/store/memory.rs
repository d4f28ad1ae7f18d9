//! In-process store client.
//!
//! Keeps keys in an ordered map and publishes every mutation on a broadcast
//! channel. Read counters make cache behaviour observable in tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::store::{KeyValue, KvStore, StoreError, WatchEvent, WatchStream};

const EVENT_BUFFER: usize = 1024;

/// Snapshot of remote-read counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub point_reads: u64,
    pub range_reads: u64,
}

pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Bytes>>,
    events: broadcast::Sender<WatchEvent>,
    point_reads: AtomicU64,
    range_reads: AtomicU64,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            data: RwLock::new(BTreeMap::new()),
            events,
            point_reads: AtomicU64::new(0),
            range_reads: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Seed a store without emitting watch events.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        let store = Self::new();
        {
            let mut data = store.data.write();
            for (k, v) in entries {
                data.insert(k.into(), v.into());
            }
        }
        store
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            point_reads: self.point_reads.load(Ordering::Relaxed),
            range_reads: self.range_reads.load(Ordering::Relaxed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of open watch streams.
    pub fn watch_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.check_open()?;
        self.point_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.data.read().get(key).cloned())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError> {
        self.check_open()?;
        self.range_reads.fetch_add(1, Ordering::Relaxed);
        let data = self.data.read();
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KeyValue {
                key: k.clone(),
                value: v.clone(),
            })
            .collect())
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.check_open()?;
        let mut data = self.data.write();
        let prev_value = data.insert(key.to_string(), value.clone());
        // send under the lock so event order matches mutation order
        let _ = self.events.send(WatchEvent {
            prev_value,
            ..WatchEvent::put(key, value)
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check_open()?;
        let mut data = self.data.write();
        match data.remove(key) {
            Some(prev) => {
                let _ = self.events.send(WatchEvent {
                    prev_value: Some(prev),
                    ..WatchEvent::delete(key)
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn watch(&self, prefix: &str) -> Result<WatchStream, StoreError> {
        self.check_open()?;
        let rx = self.events.subscribe();
        let prefix = prefix.to_string();

        let stream = futures_util::stream::unfold((rx, prefix), |(mut rx, prefix)| async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.key.starts_with(&prefix) => {
                        return Some((Ok::<_, StoreError>(vec![event]), (rx, prefix)));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(prefix = %prefix, skipped, "Watch stream lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        Ok(Box::pin(stream))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
