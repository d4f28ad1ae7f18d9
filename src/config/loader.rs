//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::config::schema::{Settings, SourceConfig};
use crate::config::validation::validate_sources;
use crate::error::{ConfigError, Result};

/// TOML cannot hold a bare top-level array, so descriptors use `[[sources]]`.
#[derive(Debug, Deserialize)]
struct TomlSources {
    #[serde(default)]
    sources: Vec<SourceConfig>,
}

/// Extension of `path` without the leading dot, lowercased.
pub fn format_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Parse a Source Descriptor document in the given format and validate it.
pub fn parse_sources(content: &[u8], format: &str) -> Result<Vec<SourceConfig>> {
    let sources: Vec<SourceConfig> = match format {
        "json" => serde_json::from_slice(content)?,
        "yaml" | "yml" => serde_yaml::from_slice(content)?,
        "toml" => {
            let text = std::str::from_utf8(content)
                .map_err(|e| ConfigError::Decode(e.to_string()))?;
            toml::from_str::<TomlSources>(text)?.sources
        }
        other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
    };

    validate_sources(&sources).map_err(ConfigError::Validation)?;

    Ok(sources)
}

/// Load and validate a Source Descriptor file; the format follows the extension.
pub fn load_sources(path: &Path) -> Result<Vec<SourceConfig>> {
    let format = format_of(path);
    if !matches!(format.as_str(), "json" | "yaml" | "yml" | "toml") {
        return Err(ConfigError::UnsupportedFormat(format));
    }

    let content = fs::read(path)?;
    parse_sources(&content, &format)
}

/// Load runtime settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&content)?;
    Ok(settings)
}
