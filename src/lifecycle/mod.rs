//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Driver construction:
//!     Shutdown::new() → subscribe() per background task → spawn
//!
//! Driver close (shutdown.rs):
//!     close() → trigger() → debounce / watch loops observe and exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → end of `dynconf watch`
//! ```
//!
//! # Design Decisions
//! - Every driver owns its own coordinator; closing one never stops another
//! - Triggering is latched; only the first close sends the signal
//! - Closing is idempotent

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
