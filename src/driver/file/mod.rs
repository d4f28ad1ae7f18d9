//! Local file driver.
//!
//! # Responsibilities
//! - Load every distinct file named by the rules at construction
//! - Serve top-level keys of each file by namespace
//! - Watch the directories of dynamic files and reload them after a quiet
//!   window, firing hooks for keys whose bytes changed
//!
//! # Data Flow
//! ```text
//! notify event (create / modify) on a watched directory
//!     → watcher.rs debounce loop (per-file deadline, reset on each event)
//!     → FileState::reload: read + parse into a scratch map
//!         parse error → logged, cached state untouched
//!     → node.rs diff under the write lock, dirty keys collected
//!     → hooks dispatched after the lock is released
//! ```
//!
//! # Design Decisions
//! - Paths are canonicalised so they match the paths notify reports
//! - Rules naming the same file share one node; the node is dynamic if any
//!   of those rules is

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use notify::RecommendedWatcher;
use parking_lot::{Mutex, RwLock};

use crate::config::{FileSettings, SourceConfig};
use crate::driver::registry::DriverFactory;
use crate::driver::{hook, Driver, Hook};
use crate::error::{ConfigError, Result};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

mod node;
mod parse;
mod watcher;

pub use parse::Format;

use node::FileNode;

/// Nodes plus the immutable lookup tables into them.
pub(crate) struct FileState {
    namespaces: HashMap<String, usize>,
    paths: HashMap<PathBuf, usize>,
    nodes: RwLock<Vec<FileNode>>,
}

impl FileState {
    /// Index of the dynamic node loaded from `path`.
    fn dynamic_index(&self, path: &Path) -> Option<usize> {
        let idx = *self.paths.get(path)?;
        self.nodes.read()[idx].dynamic.then_some(idx)
    }

    /// Paths of every dynamic node.
    fn dynamic_paths(&self) -> Vec<PathBuf> {
        self.nodes
            .read()
            .iter()
            .filter(|node| node.dynamic)
            .map(|node| node.path.clone())
            .collect()
    }

    /// Re-read one file and notify hooks of changed keys.
    async fn reload(&self, idx: usize) {
        let (path, format) = {
            let nodes = self.nodes.read();
            (nodes[idx].path.clone(), nodes[idx].format)
        };

        let scan = match tokio::fs::read(&path).await {
            Ok(content) => format.parse(&content),
            Err(e) => Err(e.into()),
        };
        let scan = match scan {
            Ok(scan) => scan,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Reload failed, keeping previous content");
                metrics::record_file_reload("failed");
                return;
            }
        };

        let changes = {
            let mut nodes = self.nodes.write();
            nodes[idx].apply(scan);
            nodes[idx].drain_dirty()
        };

        metrics::record_file_reload("ok");
        tracing::debug!(path = %path.display(), changed = changes.len(), "File reloaded");

        for change in changes {
            hook::dispatch(&change.hooks, &change.value, &change.key, "file");
        }
    }
}

/// Driver serving top-level keys of JSON, YAML and TOML files.
pub struct FileDriver {
    state: Arc<FileState>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    shutdown: Shutdown,
}

impl FileDriver {
    /// Load every file of `source`, resolved against its address, and start
    /// watching the dynamic ones.
    ///
    /// Watching requires a running tokio runtime.
    pub fn open(source: &SourceConfig, settings: &FileSettings) -> Result<Self> {
        let root = Path::new(source.address());
        let mut namespaces = HashMap::new();
        let mut paths: HashMap<PathBuf, usize> = HashMap::new();
        let mut nodes: Vec<FileNode> = Vec::new();

        for rule in &source.configs {
            let path = root.join(&rule.path);
            let idx = match lookup(&paths, &path) {
                Some(idx) => idx,
                None => {
                    let node = load(&path).map_err(|e| ConfigError::LoadFile {
                        path: path.clone(),
                        source: Box::new(e),
                    })?;
                    tracing::debug!(path = %node.path.display(), "Loaded config file");
                    paths.insert(node.path.clone(), nodes.len());
                    nodes.push(node);
                    nodes.len() - 1
                }
            };

            if rule.dynamic {
                nodes[idx].dynamic = true;
            }
            for ns in rule.namespaces() {
                namespaces.insert(ns, idx);
            }
        }

        if namespaces.is_empty() {
            return Err(ConfigError::EmptyRules);
        }

        let state = Arc::new(FileState {
            namespaces,
            paths,
            nodes: RwLock::new(nodes),
        });
        let shutdown = Shutdown::new();

        let watcher = if state.dynamic_paths().is_empty() {
            None
        } else {
            Some(watcher::spawn(state.clone(), settings.debounce(), &shutdown)?)
        };

        Ok(Self {
            state,
            watcher: Mutex::new(watcher),
            shutdown,
        })
    }

    fn index(&self, namespace: &str) -> Result<usize> {
        self.state
            .namespaces
            .get(namespace)
            .copied()
            .ok_or(ConfigError::NotFound)
    }
}

fn lookup(paths: &HashMap<PathBuf, usize>, path: &Path) -> Option<usize> {
    let canonical = std::fs::canonicalize(path).ok()?;
    paths.get(&canonical).copied()
}

fn load(path: &Path) -> Result<FileNode> {
    let format = Format::from_path(path)?;
    let path = std::fs::canonicalize(path)?;
    let content = std::fs::read(&path)?;
    let scan = format.parse(&content)?;
    Ok(FileNode::new(path, format, scan))
}

#[async_trait]
impl Driver for FileDriver {
    fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.state.namespaces.keys().cloned().collect();
        namespaces.sort();
        namespaces
    }

    fn on_key_change(&self, namespace: &str, key: &str, hook: Hook) -> bool {
        let Ok(idx) = self.index(namespace) else {
            tracing::debug!(namespace, key, "Hook refused: unknown namespace");
            return false;
        };

        let mut nodes = self.state.nodes.write();
        let node = &mut nodes[idx];
        if !node.dynamic {
            tracing::debug!(namespace, key, path = %node.path.display(), "Hook refused: file is not dynamic");
            return false;
        }
        if node.get(key).is_none() {
            tracing::debug!(namespace, key, path = %node.path.display(), "Hook refused: key not present");
            return false;
        }
        node.on_key_change(key, hook)
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Bytes> {
        let idx = self.index(namespace)?;
        let nodes = self.state.nodes.read();
        nodes[idx].get(key).cloned().ok_or(ConfigError::NotFound)
    }

    async fn get_string(&self, namespace: &str, key: &str) -> Result<String> {
        let value = self.get(namespace, key).await?;
        Ok(String::from_utf8_lossy(&value).into_owned())
    }

    fn close(&self) {
        if !self.shutdown.trigger() {
            return;
        }
        // dropping the notify watcher ends the event channel
        self.watcher.lock().take();
        tracing::debug!("File driver closed");
    }
}

impl Drop for FileDriver {
    fn drop(&mut self) {
        self.close();
    }
}

/// Factory for [`FileDriver`]s; the locator address is the root directory.
#[derive(Debug, Clone, Default)]
pub struct FileDriverFactory {
    settings: FileSettings,
}

impl FileDriverFactory {
    pub fn new(settings: FileSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DriverFactory for FileDriverFactory {
    async fn create(&self, source: &SourceConfig) -> Result<Arc<dyn Driver>> {
        Ok(Arc::new(FileDriver::open(source, &self.settings)?))
    }
}
