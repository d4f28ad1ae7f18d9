//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! descriptor file (JSON/YAML/TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Vec<SourceConfig> (validated, immutable)
//!     → handed to Engine::new
//!
//! settings file (TOML)
//!     → loader.rs
//!     → Settings (driver, binder and logging knobs)
//! ```
//!
//! # Design Decisions
//! - Descriptors are immutable once loaded; the engine never re-reads them
//! - All settings have defaults to allow minimal (or absent) settings files
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_settings, load_sources, parse_sources};
pub use schema::{
    BinderSettings, FileSettings, ObservabilityConfig, Rule, Settings, SourceConfig,
    StoreSettings,
};
