//! Configuration schema definitions.
//!
//! Two kinds of documents are described here:
//! - the Source Descriptor (`SourceConfig` + `Rule`), which tells the engine
//!   where configuration lives and which namespaces it serves;
//! - the runtime `Settings`, which tune drivers and the binder.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One entry of the Source Descriptor: a locator plus the rules it serves.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SourceConfig {
    /// Locator in `scheme://address` form.
    pub source: String,

    /// Namespace rules served by this source.
    #[serde(default)]
    pub configs: Vec<Rule>,
}

impl SourceConfig {
    pub fn new(source: impl Into<String>, configs: Vec<Rule>) -> Self {
        Self {
            source: source.into(),
            configs,
        }
    }

    /// Substring before `://`, or empty when the locator has no scheme.
    pub fn scheme(&self) -> &str {
        match self.source.find("://") {
            Some(i) => &self.source[..i],
            None => "",
        }
    }

    /// Substring after `://`, or the whole locator when there is no scheme.
    pub fn address(&self) -> &str {
        match self.source.find("://") {
            Some(i) => &self.source[i + 3..],
            None => &self.source,
        }
    }
}

/// Maps one or more namespace aliases to a path.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Rule {
    /// Pipe-separated namespace aliases, e.g. `"app|app-legacy"`.
    pub namespace: String,

    /// File path (relative to the locator root) or key prefix.
    pub path: String,

    /// Watch the path and propagate live changes.
    #[serde(default, alias = "watch")]
    pub dynamic: bool,
}

impl Rule {
    pub fn new(namespace: impl Into<String>, path: impl Into<String>, dynamic: bool) -> Self {
        Self {
            namespace: namespace.into(),
            path: path.into(),
            dynamic,
        }
    }

    /// Namespace aliases with surrounding whitespace trimmed.
    pub fn namespaces(&self) -> Vec<String> {
        self.namespace
            .split('|')
            .map(|ns| ns.trim().to_string())
            .collect()
    }
}

/// Runtime settings for drivers, binder and logging.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Settings {
    pub file: FileSettings,
    pub store: StoreSettings,
    pub binder: BinderSettings,
    pub observability: ObservabilityConfig,
}

/// File driver settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FileSettings {
    /// Quiet window after the last filesystem event before reloading.
    pub debounce_ms: u64,
}

impl FileSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for FileSettings {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

/// Distributed-store driver settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Minimum shared leading characters for two watched prefixes to share a stream.
    pub common_prefix_min_len: usize,

    /// Bulk-load every prefix when the driver is built.
    pub preload: bool,

    /// Upper bound for each preload range read, in seconds.
    pub preload_timeout_secs: u64,

    /// Connection timeout when the driver dials its own client, in seconds.
    pub dial_timeout_secs: u64,
}

impl StoreSettings {
    /// Effective coalescing length; anything below 1 falls back to the default.
    pub fn prefix_min_len(&self) -> usize {
        if self.common_prefix_min_len < 1 {
            Self::default().common_prefix_min_len
        } else {
            self.common_prefix_min_len
        }
    }

    pub fn preload_timeout(&self) -> Duration {
        Duration::from_secs(self.preload_timeout_secs)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            common_prefix_min_len: 4,
            preload: false,
            preload_timeout_secs: 60,
            dial_timeout_secs: 60,
        }
    }
}

/// Struct binder settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BinderSettings {
    /// Timeout for each individual field load, in seconds.
    pub load_timeout_secs: u64,
}

impl BinderSettings {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

impl Default for BinderSettings {
    fn default() -> Self {
        Self {
            load_timeout_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_and_address() {
        let src = SourceConfig::new("file://./etc", vec![]);
        assert_eq!(src.scheme(), "file");
        assert_eq!(src.address(), "./etc");

        let src = SourceConfig::new("etcd://10.0.0.1:2379,10.0.0.2:2379", vec![]);
        assert_eq!(src.scheme(), "etcd");
        assert_eq!(src.address(), "10.0.0.1:2379,10.0.0.2:2379");

        let bare = SourceConfig::new("./etc", vec![]);
        assert_eq!(bare.scheme(), "");
        assert_eq!(bare.address(), "./etc");
    }

    #[test]
    fn test_rule_namespaces_trimmed() {
        let rule = Rule::new("test/demo1 | test/demo2|x", "a.yaml", false);
        assert_eq!(rule.namespaces(), vec!["test/demo1", "test/demo2", "x"]);
    }

    #[test]
    fn test_rule_watch_alias() {
        let rule: Rule =
            serde_json::from_str(r#"{"namespace":"a","path":"b","watch":true}"#).unwrap();
        assert!(rule.dynamic);
    }

    #[test]
    fn test_prefix_min_len_fallback() {
        let mut s = StoreSettings::default();
        s.common_prefix_min_len = 0;
        assert_eq!(s.prefix_min_len(), 4);
        s.common_prefix_min_len = 2;
        assert_eq!(s.prefix_min_len(), 2);
    }

    #[test]
    fn test_settings_partial_toml() {
        let s: Settings = toml::from_str("[file]\ndebounce_ms = 50\n").unwrap();
        assert_eq!(s.file.debounce_ms, 50);
        assert_eq!(s.binder.load_timeout_secs, 5);
        assert_eq!(s.store.common_prefix_min_len, 4);
    }
}
