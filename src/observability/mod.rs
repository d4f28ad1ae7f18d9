//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Drivers, engine and binder produce:
//!     → tracing events (structured fields: namespace, key, path, prefix)
//!     → metrics.rs (counters via the `metrics` facade)
//!
//! Consumers:
//!     → logging.rs installs a subscriber (binary only)
//!     → any `metrics` recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - The library never installs a subscriber or recorder on its own
//! - Metrics are cheap (no-op until a recorder exists)

pub mod logging;
pub mod metrics;
