//! Format name → decoder lookup.
//!
//! Decoders turn raw bytes into a `serde_json::Value`, which is then
//! deserialized into the caller's type. This keeps the registry object-safe
//! while letting callers plug in formats of their own.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::{ConfigError, Result};

/// Format used when a binding does not name one.
pub const DEFAULT_FORMAT: &str = "yaml";

/// Raw bytes → intermediate value.
pub type DecodeFn = Arc<dyn Fn(&[u8]) -> Result<serde_json::Value> + Send + Sync>;

/// Registry of decoders keyed by format name.
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl DecoderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registry with `json`, `yaml`, `yml` and `toml`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("json", |b: &[u8]| Ok(serde_json::from_slice(b)?));
        registry.register("yaml", decode_yaml);
        registry.register("yml", decode_yaml);
        registry.register("toml", |b: &[u8]| {
            let text = std::str::from_utf8(b).map_err(|e| ConfigError::Decode(e.to_string()))?;
            Ok(toml::from_str(text)?)
        });
        registry
    }

    /// Add or replace the decoder for `format`.
    pub fn register<F>(&mut self, format: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&[u8]) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.decoders.insert(format.into(), Arc::new(f));
        self
    }

    pub fn get(&self, format: &str) -> Option<DecodeFn> {
        self.decoders.get(format).cloned()
    }

    pub fn contains(&self, format: &str) -> bool {
        self.decoders.contains_key(format)
    }

    /// Decode `bytes` as `format` into `T`. An empty format means [`DEFAULT_FORMAT`].
    pub fn decode<T: DeserializeOwned>(&self, format: &str, bytes: &[u8]) -> Result<T> {
        let format = if format.is_empty() {
            DEFAULT_FORMAT
        } else {
            format
        };

        let decoder = self
            .decoders
            .get(format)
            .ok_or_else(|| ConfigError::UnsupportedFormat(format.to_string()))?;

        let value = decoder(bytes)?;
        Ok(serde_json::from_value(value)?)
    }
}

fn decode_yaml(b: &[u8]) -> Result<serde_json::Value> {
    Ok(serde_yaml::from_slice(b)?)
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut formats: Vec<_> = self.decoders.keys().collect();
        formats.sort();
        f.debug_struct("DecoderRegistry")
            .field("formats", &formats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Work {
        title: String,
        salary: i64,
    }

    #[test]
    fn test_builtin_formats() {
        let registry = DecoderRegistry::with_defaults();

        let w: Work = registry
            .decode("json", br#"{"title":"engineer","salary":10000}"#)
            .unwrap();
        assert_eq!(w.title, "engineer");

        let w: Work = registry
            .decode("yml", b"title: engineer\nsalary: 10000\n")
            .unwrap();
        assert_eq!(w.salary, 10000);

        let w: Work = registry
            .decode("toml", b"title = \"engineer\"\nsalary = 10000\n")
            .unwrap();
        assert_eq!(w, Work { title: "engineer".into(), salary: 10000 });
    }

    #[test]
    fn test_empty_format_defaults_to_yaml() {
        let registry = DecoderRegistry::with_defaults();
        let n: Vec<u32> = registry.decode("", b"[1, 2, 3]").unwrap();
        assert_eq!(n, vec![1, 2, 3]);
    }

    #[test]
    fn test_unknown_format() {
        let registry = DecoderRegistry::with_defaults();
        let err = registry.decode::<Work>("ini", b"").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(f) if f == "ini"));
    }

    #[test]
    fn test_custom_decoder() {
        let mut registry = DecoderRegistry::with_defaults();
        registry.register("csv", |b: &[u8]| {
            let text = String::from_utf8_lossy(b);
            Ok(serde_json::Value::Array(
                text.split(',')
                    .map(|s| serde_json::Value::String(s.trim().to_string()))
                    .collect(),
            ))
        });
        let items: Vec<String> = registry.decode("csv", b"a, b,c").unwrap();
        assert_eq!(items, vec!["a", "b", "c"]);
    }
}
