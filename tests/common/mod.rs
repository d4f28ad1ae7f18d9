//! Shared fixtures for integration tests.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tempfile::TempDir;

use dynconf::config::{FileSettings, Settings};
use dynconf::driver::{hook, FileDriverFactory, Hook, StoreDriverFactory};
use dynconf::store::MemoryStore;
use dynconf::DriverRegistry;

/// A temporary directory of config files.
pub struct Fixture {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn write(&self, name: &str, content: &str) {
        fs::write(self.path(name), content).unwrap();
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// `file://` locator rooted at the fixture directory.
    pub fn locator(&self) -> String {
        format!("file://{}", self.dir.path().display())
    }
}

/// Settings with a short file debounce window.
#[allow(dead_code)]
pub fn fast_settings(debounce_ms: u64) -> Settings {
    Settings {
        file: FileSettings { debounce_ms },
        ..Settings::default()
    }
}

#[allow(dead_code)]
pub fn seeded_store(entries: &[(&str, &str)]) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_entries(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Bytes::copy_from_slice(v.as_bytes()))),
    ))
}

/// Registry with `file` and an `etcd` scheme served by `store`.
#[allow(dead_code)]
pub fn registry(store: &Arc<MemoryStore>, settings: &Settings) -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    registry.register("file", FileDriverFactory::new(settings.file.clone()));
    registry.register(
        "etcd",
        StoreDriverFactory::with_store(store.clone(), settings.store.clone()),
    );
    registry
}

/// Hook that records every value it receives.
#[allow(dead_code)]
pub fn recorder() -> (Hook, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let h = hook(move |raw| {
        sink.lock().push(String::from_utf8_lossy(raw).into_owned());
        Ok(())
    });
    (h, seen)
}

/// Poll `check` until it holds or `timeout` passes.
#[allow(dead_code)]
pub async fn wait_until<F>(timeout: Duration, check: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
