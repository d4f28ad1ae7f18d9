//! Distributed-store driver.
//!
//! # Responsibilities
//! - Map each rule's namespaces to a per-path [`Kv`] cache
//! - Optionally preload every path at construction
//! - Watch the paths of dynamic rules through one coalescing [`Watcher`]
//!
//! # Design Decisions
//! - Rules sharing a path share one cache and one observer
//! - A driver built on a shared client leaves it open on close unless asked
//!   otherwise; a client the driver dialed itself is always closed
//! - Construction failures close a client the driver owns

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::{SourceConfig, StoreSettings};
use crate::driver::registry::DriverFactory;
use crate::driver::{Driver, Hook};
use crate::error::{ConfigError, Result};
use crate::lifecycle::Shutdown;
use crate::store::{Kv, KvStore, Watcher};

/// Driver serving namespaces from key prefixes of a remote store.
pub struct StoreDriver {
    store: Arc<dyn KvStore>,
    close_store: bool,
    namespaces: HashMap<String, Arc<Kv>>,
    watcher: Option<Watcher>,
    shutdown: Shutdown,
}

impl StoreDriver {
    /// Build a driver for `source` on top of `store`.
    ///
    /// When `close_store` is set the client is closed on failure and when the
    /// driver closes.
    pub async fn open(
        source: &SourceConfig,
        store: Arc<dyn KvStore>,
        close_store: bool,
        settings: &StoreSettings,
    ) -> Result<Self> {
        match Self::build(source, store.clone(), close_store, settings).await {
            Ok(driver) => Ok(driver),
            Err(e) => {
                if close_store {
                    store.close();
                }
                Err(e)
            }
        }
    }

    async fn build(
        source: &SourceConfig,
        store: Arc<dyn KvStore>,
        close_store: bool,
        settings: &StoreSettings,
    ) -> Result<Self> {
        let mut watcher =
            Watcher::new(store.clone()).with_common_prefix_min_len(settings.prefix_min_len());
        let mut paths: HashMap<&str, Arc<Kv>> = HashMap::new();
        let mut watched: HashSet<&str> = HashSet::new();
        let mut namespaces = HashMap::new();

        for rule in &source.configs {
            let node = match paths.get(rule.path.as_str()) {
                Some(node) => node.clone(),
                None => {
                    let node = Arc::new(Kv::new(rule.path.clone(), store.clone()));
                    if settings.preload {
                        preload(&node, settings).await?;
                    }
                    paths.insert(&rule.path, node.clone());
                    node
                }
            };

            if rule.dynamic && watched.insert(&rule.path) {
                watcher.attach(node.clone());
            }

            for ns in rule.namespaces() {
                namespaces.insert(ns, node.clone());
            }
        }

        if namespaces.is_empty() {
            return Err(ConfigError::EmptyRules);
        }

        let shutdown = Shutdown::new();
        let watcher = if watched.is_empty() {
            None
        } else {
            watcher.run(&shutdown).await?;
            tracing::info!(
                source = %source.source,
                streams = watcher.prefixes().len(),
                observers = watcher.observer_count(),
                "Store watcher started"
            );
            Some(watcher)
        };

        Ok(Self {
            store,
            close_store,
            namespaces,
            watcher,
            shutdown,
        })
    }

    fn node(&self, namespace: &str) -> Result<&Arc<Kv>> {
        self.namespaces.get(namespace).ok_or(ConfigError::NotFound)
    }
}

async fn preload(node: &Kv, settings: &StoreSettings) -> Result<()> {
    let timeout = settings.preload_timeout();
    match tokio::time::timeout(timeout, node.preload()).await {
        Ok(result) => result.map_err(|e| {
            tracing::error!(prefix = node.prefix(), error = %e, "Preload failed");
            e
        }),
        Err(_) => {
            tracing::error!(prefix = node.prefix(), ?timeout, "Preload timed out");
            Err(ConfigError::Timeout(timeout))
        }
    }
}

#[async_trait]
impl Driver for StoreDriver {
    fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.namespaces.keys().cloned().collect();
        namespaces.sort();
        namespaces
    }

    fn on_key_change(&self, namespace: &str, key: &str, hook: Hook) -> bool {
        let Ok(node) = self.node(namespace) else {
            tracing::debug!(namespace, key, "Hook refused: unknown namespace");
            return false;
        };

        match &self.watcher {
            Some(watcher) if watcher.has_observer(node.prefix()) => node.on_key_change(key, hook),
            _ => {
                tracing::debug!(namespace, key, prefix = node.prefix(), "Hook refused: prefix is not watched");
                false
            }
        }
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Bytes> {
        self.node(namespace)?.get(key).await
    }

    async fn get_string(&self, namespace: &str, key: &str) -> Result<String> {
        self.node(namespace)?.get_string(key).await
    }

    fn close(&self) {
        if !self.shutdown.trigger() {
            return;
        }
        if self.close_store {
            self.store.close();
        }
        tracing::debug!(namespaces = self.namespaces.len(), "Store driver closed");
    }
}

impl Drop for StoreDriver {
    fn drop(&mut self) {
        self.close();
    }
}

enum StoreClient {
    Shared(Arc<dyn KvStore>),
    #[cfg(feature = "etcd")]
    Dial,
}

/// Factory for [`StoreDriver`]s.
pub struct StoreDriverFactory {
    client: StoreClient,
    close_shared: bool,
    settings: StoreSettings,
}

impl StoreDriverFactory {
    /// Every driver uses `store`; locator addresses are ignored.
    pub fn with_store(store: Arc<dyn KvStore>, settings: StoreSettings) -> Self {
        Self {
            client: StoreClient::Shared(store),
            close_shared: false,
            settings,
        }
    }

    /// Close the shared client when a driver built from it closes.
    pub fn close_shared_store(mut self) -> Self {
        self.close_shared = true;
        self
    }

    /// Each driver dials the comma-separated etcd endpoints of its locator.
    #[cfg(feature = "etcd")]
    pub fn dial(settings: StoreSettings) -> Self {
        Self {
            client: StoreClient::Dial,
            close_shared: false,
            settings,
        }
    }
}

#[async_trait]
impl DriverFactory for StoreDriverFactory {
    async fn create(&self, source: &SourceConfig) -> Result<Arc<dyn Driver>> {
        let (store, close_store): (Arc<dyn KvStore>, bool) = match &self.client {
            StoreClient::Shared(store) => (store.clone(), self.close_shared),
            #[cfg(feature = "etcd")]
            StoreClient::Dial => {
                let endpoints: Vec<String> = source
                    .address()
                    .split(',')
                    .map(|e| e.trim().to_string())
                    .filter(|e| !e.is_empty())
                    .collect();
                let store = crate::store::etcd::EtcdStore::connect(
                    &endpoints,
                    self.settings.dial_timeout(),
                )
                .await?;
                (Arc::new(store), true)
            }
        };

        let driver = StoreDriver::open(source, store, close_store, &self.settings).await?;
        Ok(Arc::new(driver))
    }
}
