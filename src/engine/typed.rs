//! Text helpers behind the typed getters.

use crate::error::{ConfigError, Result};

/// Trim whitespace and strip one layer of matching quotes.
///
/// Double-quoted text is unescaped with JSON escape rules; if that fails the
/// quotes are simply removed. Single-quoted text is never unescaped.
pub fn unquote(s: &str) -> String {
    let s = s.trim();
    if let Some(inner) = s.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        return serde_json::from_str::<String>(s).unwrap_or_else(|_| inner.to_string());
    }
    if let Some(inner) = s.strip_prefix('\'').and_then(|rest| rest.strip_suffix('\'')) {
        return inner.to_string();
    }

    s.to_string()
}

/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`.
pub fn parse_bool(s: &str) -> Result<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(ConfigError::ParseBool(s.to_string())),
    }
}
