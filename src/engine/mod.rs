//! Routing engine: `(namespace, key)` → driver.
//!
//! # Responsibilities
//! - Build one driver per distinct source locator
//! - Route every lookup to the driver owning its namespace
//! - Convert raw values into scalars or decoded structures
//!
//! # Design Decisions
//! - The namespace map is built once and never mutated, so lookups take no lock
//! - Construction is all-or-nothing: any failure closes every driver opened so far
//! - `get_raw` returns an owned copy; `get_raw_shared` hands out the cached bytes

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::binder::Watched;
use crate::config::{load_sources, parse_sources, SourceConfig};
use crate::driver::{hook, DecoderRegistry, Driver, DriverRegistry, Hook};
use crate::error::{ConfigError, Result};
use crate::store::KvStore;

pub mod typed;

pub use typed::{parse_bool, unquote};

/// Namespace-addressed view over every configured driver.
pub struct Engine {
    drivers: HashMap<String, Arc<dyn Driver>>,
    opened: Vec<Arc<dyn Driver>>,
    decoders: Arc<DecoderRegistry>,
}

impl Engine {
    /// Open a driver for every source and index its namespaces.
    ///
    /// Entries naming the same locator are merged into one driver.
    pub async fn new(sources: &[SourceConfig], registry: &DriverRegistry) -> Result<Self> {
        if sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let mut engine = Self {
            drivers: HashMap::new(),
            opened: Vec::new(),
            decoders: Arc::new(DecoderRegistry::with_defaults()),
        };

        for source in merge(sources) {
            let driver = match registry.open(&source).await {
                Ok(driver) => driver,
                Err(e) => {
                    tracing::error!(source = %source.source, error = %e, "Failed to open driver");
                    engine.close();
                    return Err(e);
                }
            };
            engine.opened.push(driver.clone());

            for ns in driver.namespaces() {
                if engine.drivers.contains_key(&ns) {
                    tracing::error!(namespace = %ns, source = %source.source, "Duplicate namespace");
                    engine.close();
                    return Err(ConfigError::DuplicateNamespace(ns));
                }
                engine.drivers.insert(ns, driver.clone());
            }

            tracing::debug!(source = %source.source, rules = source.configs.len(), "Driver opened");
        }

        tracing::info!(
            drivers = engine.opened.len(),
            namespaces = engine.drivers.len(),
            "Config engine ready"
        );
        Ok(engine)
    }

    /// Build from a Source Descriptor file; the format follows the extension.
    pub async fn from_file(path: impl AsRef<Path>, registry: &DriverRegistry) -> Result<Self> {
        let sources = load_sources(path.as_ref())?;
        Self::new(&sources, registry).await
    }

    /// Build from a Source Descriptor stored under `meta_key`.
    pub async fn from_store(
        store: &dyn KvStore,
        meta_key: &str,
        format: &str,
        registry: &DriverRegistry,
    ) -> Result<Self> {
        let content = store.get(meta_key).await?.ok_or(ConfigError::NotFound)?;
        let sources = parse_sources(&content, format)?;
        Self::new(&sources, registry).await
    }

    /// Replace the decoders used by [`decode_format`](Self::decode_format) and the binder.
    pub fn with_decoders(mut self, decoders: DecoderRegistry) -> Self {
        self.decoders = Arc::new(decoders);
        self
    }

    pub fn decoders(&self) -> &Arc<DecoderRegistry> {
        &self.decoders
    }

    /// Every routed namespace, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.drivers.keys().cloned().collect();
        namespaces.sort();
        namespaces
    }

    fn driver(&self, namespace: &str) -> Result<&Arc<dyn Driver>> {
        self.drivers.get(namespace).ok_or(ConfigError::NotFound)
    }

    /// Register `f` to run with the new raw value whenever the key changes.
    pub fn on_key_change<F>(&self, namespace: &str, key: &str, f: F) -> bool
    where
        F: Fn(&[u8]) -> Result<()> + Send + Sync + 'static,
    {
        self.on_key_change_hook(namespace, key, hook(f))
    }

    pub fn on_key_change_hook(&self, namespace: &str, key: &str, hook: Hook) -> bool {
        let registered = match self.driver(namespace) {
            Ok(driver) => driver.on_key_change(namespace, key, hook),
            Err(_) => false,
        };

        if !registered {
            tracing::warn!(namespace, key, "Change hook registration failed");
        }
        registered
    }

    /// Owned copy of the raw value.
    pub async fn get_raw(&self, namespace: &str, key: &str) -> Result<Vec<u8>> {
        Ok(self.get_raw_shared(namespace, key).await?.to_vec())
    }

    /// The cached raw value itself, without copying.
    pub async fn get_raw_shared(&self, namespace: &str, key: &str) -> Result<Bytes> {
        self.driver(namespace)?.get(namespace, key).await
    }

    pub async fn get_raw_string(&self, namespace: &str, key: &str) -> Result<String> {
        self.driver(namespace)?.get_string(namespace, key).await
    }

    /// Text value, trimmed and with one layer of quotes removed.
    pub async fn string(&self, namespace: &str, key: &str) -> Result<String> {
        Ok(unquote(&self.get_raw_string(namespace, key).await?))
    }

    pub async fn int64(&self, namespace: &str, key: &str) -> Result<i64> {
        Ok(self.string(namespace, key).await?.parse()?)
    }

    pub async fn int(&self, namespace: &str, key: &str) -> Result<isize> {
        Ok(self.string(namespace, key).await?.parse()?)
    }

    pub async fn float64(&self, namespace: &str, key: &str) -> Result<f64> {
        Ok(self.string(namespace, key).await?.parse()?)
    }

    pub async fn bool(&self, namespace: &str, key: &str) -> Result<bool> {
        parse_bool(&self.string(namespace, key).await?)
    }

    /// Parse the unquoted text value with `T`'s `FromStr`.
    pub async fn parse<T>(&self, namespace: &str, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.string(namespace, key)
            .await?
            .parse()
            .map_err(|e: T::Err| ConfigError::Decode(e.to_string()))
    }

    /// Run `f` over the raw value.
    pub async fn decode<T, F>(&self, namespace: &str, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> Result<T>,
    {
        let raw = self.get_raw_shared(namespace, key).await?;
        f(&raw)
    }

    pub async fn json_decode<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<T> {
        self.decode(namespace, key, |b| Ok(serde_json::from_slice(b)?)).await
    }

    pub async fn yaml_decode<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<T> {
        self.decode(namespace, key, |b| Ok(serde_yaml::from_slice(b)?)).await
    }

    pub async fn toml_decode<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<T> {
        self.decode(namespace, key, |b| {
            let text = std::str::from_utf8(b).map_err(|e| ConfigError::Decode(e.to_string()))?;
            Ok(toml::from_str(text)?)
        })
        .await
    }

    /// Decode with the registered decoder for `format` (empty means yaml).
    pub async fn decode_format<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
        format: &str,
    ) -> Result<T> {
        let raw = self.get_raw_shared(namespace, key).await?;
        self.decoders.decode(format, &raw)
    }

    /// Decode the value and publish it into `slot`.
    pub async fn store_into<T>(
        &self,
        namespace: &str,
        key: &str,
        format: &str,
        slot: &Watched<T>,
    ) -> Result<Arc<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let value = Arc::new(self.decode_format::<T>(namespace, key, format).await?);
        slot.store(value.clone());
        Ok(value)
    }

    /// Close every driver once.
    pub fn close(&self) {
        for driver in &self.opened {
            driver.close();
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("namespaces", &self.namespaces())
            .field("drivers", &self.opened.len())
            .field("decoders", &self.decoders)
            .finish()
    }
}

/// Fold entries with the same locator into one, keeping first-seen order.
fn merge(sources: &[SourceConfig]) -> Vec<SourceConfig> {
    let mut merged: Vec<SourceConfig> = Vec::with_capacity(sources.len());
    for source in sources {
        match merged.iter_mut().find(|m| m.source == source.source) {
            Some(existing) => existing.configs.extend(source.configs.iter().cloned()),
            None => merged.push(source.clone()),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Rule;

    #[test]
    fn test_merge_same_locator() {
        let sources = vec![
            SourceConfig::new("file://a", vec![Rule::new("x", "x.yaml", false)]),
            SourceConfig::new("file://b", vec![Rule::new("y", "y.yaml", false)]),
            SourceConfig::new("file://a", vec![Rule::new("z", "z.yaml", true)]),
        ];

        let merged = merge(&sources);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].source, "file://a");
        assert_eq!(merged[0].configs.len(), 2);
        assert_eq!(merged[1].source, "file://b");
    }

    #[tokio::test]
    async fn test_no_sources() {
        let registry = DriverRegistry::new();
        assert!(matches!(
            Engine::new(&[], &registry).await,
            Err(ConfigError::NoSources)
        ));
    }
}
