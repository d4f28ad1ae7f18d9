//! Crate-wide error type.
//!
//! # Taxonomy
//! - Lookup: `NotFound` (unknown namespace, absent or deleted key, no lazy loader)
//! - Format: `UnsupportedFormat` (file extension or decoder not registered)
//! - Construction: unknown scheme, duplicate namespace, empty rules, invalid
//!   descriptor. All fatal at engine build time.
//! - Runtime: decode and parse failures, returned straight to the caller.

use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::validation::ValidationError;
use crate::store::StoreError;

/// Errors produced by drivers, the engine and the binder.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Namespace or key is unknown, or the key was deleted.
    #[error("not found")]
    NotFound,

    /// File extension or decoder format has no registered handler.
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// No driver factory is registered for the locator scheme.
    #[error("unknown driver scheme: {0}")]
    UnknownScheme(String),

    /// Two drivers claim the same namespace.
    #[error("duplicate namespace: {0}")]
    DuplicateNamespace(String),

    /// A driver was built from a descriptor with no rules.
    #[error("config rules is empty")]
    EmptyRules,

    /// The engine was built from an empty descriptor list.
    #[error("no config sources given")]
    NoSources,

    /// Source descriptor failed semantic validation.
    #[error("{}", join_validation(.0))]
    Validation(Vec<ValidationError>),

    /// Binding tag could not be parsed.
    #[error("invalid config tag: {0}")]
    InvalidTag(String),

    /// A watched field points at a key whose driver cannot notify changes.
    #[error("key {namespace} {key} not watchable but {field} is watched")]
    NotWatchable {
        namespace: String,
        key: String,
        field: String,
    },

    /// A file named by a rule could not be loaded.
    #[error("load file {} failed: {source}", .path.display())]
    LoadFile {
        path: PathBuf,
        #[source]
        source: Box<ConfigError>,
    },

    /// Binding of one struct field failed.
    #[error("field {field}: {source}")]
    Field {
        field: String,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    /// Failure reported by a caller-registered decoder.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid integer: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("invalid float: {0}")]
    ParseFloat(#[from] ParseFloatError),

    #[error("invalid bool: {0:?}")]
    ParseBool(String),

    /// A change hook rejected a new value.
    #[error("hook failed: {0}")]
    Hook(String),

    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl ConfigError {
    /// True for errors that signal absence rather than failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::NotFound)
    }
}

fn join_validation(errors: &[ValidationError]) -> String {
    let mut out = String::from("Validation failed: ");
    for (i, err) in errors.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&err.to_string());
    }
    out
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
