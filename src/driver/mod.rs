//! Configuration drivers.
//!
//! # Data Flow
//! ```text
//! SourceConfig (scheme://address + rules)
//!     → registry.rs (scheme → DriverFactory)
//!     → file::FileDriver   (local JSON/YAML/TOML, debounced reload)
//!     → store::StoreDriver (distributed KV, cached + watched)
//!     → Arc<dyn Driver> handed to the engine
//!
//! On change:
//!     driver detects new bytes for a key
//!     → hook.rs dispatches every registered hook (errors and panics isolated)
//! ```
//!
//! # Design Decisions
//! - Drivers own their namespace map; it is fixed at construction
//! - Values are `Bytes` so cached content is shared, never copied, on read
//! - `close()` takes `&self` and is idempotent; drivers also close on drop

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub mod decoder;
pub mod file;
pub mod hook;
pub mod registry;
pub mod store;

pub use decoder::{DecodeFn, DecoderRegistry};
pub use file::{FileDriver, FileDriverFactory};
pub use hook::{hook, Hook};
pub use registry::{DriverFactory, DriverRegistry};
pub use store::{StoreDriver, StoreDriverFactory};

/// A source of configuration values addressed by `(namespace, key)`.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Every namespace this driver serves.
    fn namespaces(&self) -> Vec<String>;

    /// Register a change hook. Returns false if the key can never notify.
    fn on_key_change(&self, namespace: &str, key: &str, hook: Hook) -> bool;

    /// Raw value of a key; `NotFound` when absent or deleted.
    async fn get(&self, namespace: &str, key: &str) -> Result<Bytes>;

    /// Value of a key as text; `NotFound` when absent or deleted.
    async fn get_string(&self, namespace: &str, key: &str) -> Result<String>;

    /// Stop background work and release resources.
    fn close(&self);
}
