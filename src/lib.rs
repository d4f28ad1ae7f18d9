//! Dynamic configuration distribution.
//!
//! Configuration values live in pluggable backends (local files, a
//! distributed key-value store) and are addressed uniformly by
//! `(namespace, key)`.
//!
//! # Architecture Overview
//!
//! ```text
//!   Source Descriptor (config)
//!          │
//!          ▼
//!   DriverRegistry ──scheme──▶ FileDriver ──────────────┐
//!          │                   StoreDriver ─ Kv caches  │
//!          │                        │        Watcher    │
//!          ▼                        ▼                   ▼
//!   Engine (namespace → driver)  typed getters, decode, change hooks
//!          │
//!          ▼
//!   Binder ── Bind tables ──▶ plain fields, Watched<T> slots, LazyTable
//! ```

pub mod binder;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod store;

pub use binder::{Bind, Binder, Bindings, LazyTable, Watched};
pub use config::{Rule, Settings, SourceConfig};
pub use driver::{hook, Driver, DriverRegistry, Hook};
pub use engine::Engine;
pub use error::{ConfigError, Result};
pub use lifecycle::Shutdown;
