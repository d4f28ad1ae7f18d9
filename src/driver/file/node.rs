//! Per-file entry cache and its reload diff.

use std::collections::HashMap;
use std::path::PathBuf;

use bytes::Bytes;

use crate::driver::file::parse::Format;
use crate::driver::Hook;

struct Entry {
    value: Bytes,
    exists: bool,
    dirty: bool,
    hooks: Vec<Hook>,
}

impl Entry {
    fn new(value: Bytes) -> Self {
        Self {
            value,
            exists: true,
            dirty: false,
            hooks: Vec::new(),
        }
    }
}

/// A change to deliver once the node's lock is released.
pub(crate) struct Change {
    pub key: String,
    pub value: Bytes,
    pub hooks: Vec<Hook>,
}

pub(crate) struct FileNode {
    pub path: PathBuf,
    pub format: Format,
    pub dynamic: bool,
    entries: HashMap<String, Entry>,
}

impl FileNode {
    pub fn new(path: PathBuf, format: Format, scan: HashMap<String, Bytes>) -> Self {
        Self {
            path,
            format,
            dynamic: false,
            entries: scan
                .into_iter()
                .map(|(k, v)| (k, Entry::new(v)))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.entries
            .get(key)
            .filter(|entry| entry.exists)
            .map(|entry| &entry.value)
    }

    /// Attach a hook to a key currently present in a dynamic file.
    pub fn on_key_change(&mut self, key: &str, hook: Hook) -> bool {
        if !self.dynamic {
            return false;
        }
        match self.entries.get_mut(key) {
            Some(entry) if entry.exists => {
                entry.hooks.push(hook);
                true
            }
            _ => false,
        }
    }

    /// Merge a fresh scan of the file.
    ///
    /// Changed values of hooked keys are marked dirty. Keys missing from the
    /// scan are dropped, unless hooked; those are kept as absent so their
    /// hooks survive a later reappearance.
    pub fn apply(&mut self, mut scan: HashMap<String, Bytes>) {
        self.entries.retain(|key, entry| match scan.remove(key) {
            Some(value) => {
                if !entry.exists || entry.value != value {
                    entry.value = value;
                    entry.exists = true;
                    entry.dirty = !entry.hooks.is_empty();
                }
                true
            }
            None if entry.hooks.is_empty() => false,
            None => {
                entry.value = Bytes::new();
                entry.exists = false;
                entry.dirty = false;
                true
            }
        });

        for (key, value) in scan {
            self.entries.insert(key, Entry::new(value));
        }
    }

    /// Take every pending change, clearing the dirty flags.
    pub fn drain_dirty(&mut self) -> Vec<Change> {
        self.entries
            .iter_mut()
            .filter(|(_, entry)| entry.dirty)
            .map(|(key, entry)| {
                entry.dirty = false;
                Change {
                    key: key.clone(),
                    value: entry.value.clone(),
                    hooks: entry.hooks.clone(),
                }
            })
            .collect()
    }
}
