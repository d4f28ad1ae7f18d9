//! Locator scheme → driver factory.
//!
//! # Responsibilities
//! - Map a scheme (`file`, `etcd`, ...) to the factory that builds its driver
//! - Resolve a `SourceConfig` to a live driver
//!
//! # Design Decisions
//! - The registry is an explicit value passed to the engine, not global state
//! - Registration happens before engine construction; the engine only reads it

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Settings, SourceConfig};
use crate::driver::file::FileDriverFactory;
use crate::driver::Driver;
use crate::error::{ConfigError, Result};

/// Builds a driver for one source descriptor entry.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn create(&self, source: &SourceConfig) -> Result<Arc<dyn Driver>>;
}

/// Scheme → factory table.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: HashMap<String, Arc<dyn DriverFactory>>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `file` scheme, plus `etcd` when that feature is enabled.
    pub fn with_defaults(settings: &Settings) -> Self {
        let mut registry = Self::new();
        registry.register("file", FileDriverFactory::new(settings.file.clone()));

        #[cfg(feature = "etcd")]
        registry.register(
            "etcd",
            crate::driver::store::StoreDriverFactory::dial(settings.store.clone()),
        );

        registry
    }

    /// Add or replace the factory for `scheme`.
    pub fn register<F>(&mut self, scheme: impl Into<String>, factory: F) -> &mut Self
    where
        F: DriverFactory + 'static,
    {
        self.factories.insert(scheme.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.factories.contains_key(scheme)
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.factories.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Build the driver for `source` using the factory of its scheme.
    pub async fn open(&self, source: &SourceConfig) -> Result<Arc<dyn Driver>> {
        let scheme = source.scheme();
        let factory = self
            .factories
            .get(scheme)
            .ok_or_else(|| ConfigError::UnknownScheme(scheme.to_string()))?;

        factory.create(source).await
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}
