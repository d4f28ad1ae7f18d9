//! Distributed key-value store plumbing.
//!
//! # Data Flow
//! ```text
//! KvStore (remote client: etcd, or MemoryStore in-process)
//!     ← kv.rs point reads / range reads on cache miss or preload
//!     → watcher.rs one watch stream per aggregated prefix
//!         → fan-out of each event to every Observer whose prefix matches
//!             → Kv::handle updates the local cache, fires hooks on PUT
//! ```
//!
//! # Design Decisions
//! - The client is a trait so drivers can share one connection or own one
//! - Watch streams deliver batches in store order; no cross-stream ordering
//! - Stream failures end that stream's task; reconnecting is the client's job

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;

#[cfg(feature = "etcd")]
pub mod etcd;
pub mod kv;
pub mod memory;
pub mod watcher;

pub use kv::Kv;
pub use memory::{MemoryStore, StoreStats};
pub use watcher::{Observer, Watcher};

/// Errors reported by a store client.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("watch failed: {0}")]
    Watch(String),

    #[error("store client closed")]
    Closed,
}

/// A key and its value, as returned by range reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Put => "put",
            EventKind::Delete => "delete",
        }
    }
}

/// One change observed on a watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventKind,
    /// Full key, including the watched prefix.
    pub key: String,
    /// New value; empty for deletes.
    pub value: Bytes,
    /// Value before the change, when the store reported it.
    pub prev_value: Option<Bytes>,
}

impl WatchEvent {
    pub fn put(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            kind: EventKind::Put,
            key: key.into(),
            value: value.into(),
            prev_value: None,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Delete,
            key: key.into(),
            value: Bytes::new(),
            prev_value: None,
        }
    }
}

/// Stream of event batches for one watched prefix.
pub type WatchStream = Pin<Box<dyn Stream<Item = Result<Vec<WatchEvent>, StoreError>> + Send>>;

/// Client of a distributed key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Point read; `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Range read of every key under `prefix`, in key order.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError>;

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError>;

    /// Remove a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Open a long-lived watch on every key under `prefix`, reporting previous values.
    async fn watch(&self, prefix: &str) -> Result<WatchStream, StoreError>;

    /// Release the connection. Default is a no-op.
    fn close(&self) {}
}
