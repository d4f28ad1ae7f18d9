//! Flattening of structured files into top-level key → raw bytes.

use std::collections::HashMap;
use std::path::Path;

use bytes::Bytes;
use serde_json::value::RawValue;

use crate::error::{ConfigError, Result};

/// Supported file formats, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        match ext.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "toml" => Ok(Format::Toml),
            _ => Err(ConfigError::UnsupportedFormat(format!(".{ext}"))),
        }
    }

    /// Parse `content` into its top-level entries.
    pub fn parse(self, content: &[u8]) -> Result<HashMap<String, Bytes>> {
        match self {
            Format::Json => parse_json(content),
            Format::Yaml => parse_yaml(content),
            Format::Toml => parse_toml(content),
        }
    }
}

/// Each value keeps its exact source text.
fn parse_json(content: &[u8]) -> Result<HashMap<String, Bytes>> {
    let raw: HashMap<String, Box<RawValue>> = serde_json::from_slice(content)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| (k, Bytes::copy_from_slice(v.get().as_bytes())))
        .collect())
}

/// Nulls become empty, strings go through [`yaml_string`], everything else
/// is re-serialised.
fn parse_yaml(content: &[u8]) -> Result<HashMap<String, Bytes>> {
    let Some(mapping) = serde_yaml::from_slice::<Option<serde_yaml::Mapping>>(content)? else {
        return Ok(HashMap::new());
    };

    let mut entries = HashMap::with_capacity(mapping.len());
    for (key, value) in mapping {
        let key = match key {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            other => {
                return Err(ConfigError::Decode(format!("unsupported yaml key: {other:?}")));
            }
        };

        let value = match value {
            serde_yaml::Value::Null => Bytes::new(),
            serde_yaml::Value::String(s) => yaml_string(s)?,
            other => {
                let text = serde_yaml::to_string(&other)?;
                Bytes::from(text.trim_end_matches('\n').to_string())
            }
        };
        entries.insert(key, value);
    }

    Ok(entries)
}

/// A string scalar as text that decodes back to the same string.
///
/// Text that reads back unchanged as a plain scalar stays bare; anything else
/// (`"1.0"`, `"true"`, padded or multi-line text) is written double-quoted
/// with JSON escapes, which YAML reads as the same string.
fn yaml_string(s: String) -> Result<Bytes> {
    let plain = matches!(
        serde_yaml::from_str::<serde_yaml::Value>(&s),
        Ok(serde_yaml::Value::String(ref read)) if *read == s
    );

    if plain {
        Ok(Bytes::from(s))
    } else {
        Ok(Bytes::from(serde_json::to_string(&s)?))
    }
}

/// Strings are kept unquoted, tables re-serialised, other values inline.
fn parse_toml(content: &[u8]) -> Result<HashMap<String, Bytes>> {
    let text = std::str::from_utf8(content).map_err(|e| ConfigError::Decode(e.to_string()))?;
    let table: toml::Table = toml::from_str(text)?;

    let mut entries = HashMap::with_capacity(table.len());
    for (key, value) in table {
        let text = match value {
            toml::Value::String(s) => s,
            toml::Value::Table(t) => toml::to_string(&t)?,
            other => other.to_string(),
        };
        entries.insert(key, Bytes::from(text.trim_end_matches('\n').to_string()));
    }

    Ok(entries)
}
