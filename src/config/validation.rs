//! Source descriptor validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject locators without a scheme
//! - Reject empty namespace aliases and empty paths
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: &[SourceConfig] → Result<(), Vec<ValidationError>>
//! - Duplicate namespaces are detected later by the engine, across drivers

use thiserror::Error;

use crate::config::schema::SourceConfig;

/// A single semantic problem in a source descriptor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("source {index}: locator {locator:?} has no scheme")]
    MissingScheme { index: usize, locator: String },

    #[error("source {index}: rule {rule} has an empty namespace alias")]
    EmptyNamespace { index: usize, rule: usize },

    #[error("source {index}: rule {rule} has an empty path")]
    EmptyPath { index: usize, rule: usize },

    #[error("source {index}: no rules configured")]
    NoRules { index: usize },
}

/// Validate every descriptor entry, collecting all problems.
pub fn validate_sources(sources: &[SourceConfig]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (index, src) in sources.iter().enumerate() {
        if src.scheme().is_empty() {
            errors.push(ValidationError::MissingScheme {
                index,
                locator: src.source.clone(),
            });
        }

        if src.configs.is_empty() {
            errors.push(ValidationError::NoRules { index });
        }

        for (rule_idx, rule) in src.configs.iter().enumerate() {
            if rule.namespaces().iter().any(|ns| ns.is_empty()) {
                errors.push(ValidationError::EmptyNamespace {
                    index,
                    rule: rule_idx,
                });
            }
            if rule.path.trim().is_empty() {
                errors.push(ValidationError::EmptyPath {
                    index,
                    rule: rule_idx,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Rule;

    #[test]
    fn test_valid_descriptor() {
        let sources = vec![SourceConfig::new(
            "file://./etc",
            vec![Rule::new("a|b", "a.yaml", true)],
        )];
        assert!(validate_sources(&sources).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let sources = vec![
            SourceConfig::new("./etc", vec![Rule::new("a||b", "", false)]),
            SourceConfig::new("file://x", vec![]),
        ];
        let errors = validate_sources(&sources).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::NoRules { index: 1 }));
        assert!(errors.contains(&ValidationError::EmptyPath { index: 0, rule: 0 }));
    }
}
