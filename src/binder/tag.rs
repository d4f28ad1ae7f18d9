//! Binding tag grammar.
//!
//! ```text
//! namespace:<NS>;key:<K>;format:<F>;lazy:<bool>;watch:<bool>
//! ```
//! `namespace` and `key` are mandatory. Unknown keys and empty segments are
//! ignored.

use std::str::FromStr;

use crate::engine::parse_bool;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindTag {
    pub namespace: String,
    pub key: String,
    /// Decoder format; empty selects the default.
    pub format: String,
    pub lazy: bool,
    pub watch: bool,
}

impl FromStr for BindTag {
    type Err = ConfigError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let mut parsed = BindTag::default();

        for segment in tag.split(';') {
            if segment.trim().is_empty() {
                continue;
            }

            let (name, value) = match segment.split_once(':') {
                Some((name, value)) if !name.is_empty() => (name.trim(), value.trim()),
                _ => return Err(ConfigError::InvalidTag(format!("malformed segment {segment:?}"))),
            };

            match name {
                "namespace" => parsed.namespace = value.to_string(),
                "key" => parsed.key = value.to_string(),
                "format" => parsed.format = value.to_string(),
                "lazy" => {
                    parsed.lazy = parse_bool(value)
                        .map_err(|_| ConfigError::InvalidTag(format!("invalid lazy value {value:?}")))?;
                }
                "watch" => {
                    parsed.watch = parse_bool(value)
                        .map_err(|_| ConfigError::InvalidTag(format!("invalid watch value {value:?}")))?;
                }
                _ => {}
            }
        }

        if parsed.namespace.is_empty() || parsed.key.is_empty() {
            return Err(ConfigError::InvalidTag(
                "namespace and key are required".to_string(),
            ));
        }

        Ok(parsed)
    }
}
