/*!
 * Signals Module
 * Pollable, consuming signal sources emulating Linux signalfd
 */

mod atomic_stats;
mod context;
mod process;
pub mod strategy;
pub mod traits;
pub mod types;

// Re-export public API
pub use atomic_stats::{AtomicContextStats, ContextStats};
pub use context::SignalContext;
pub use process::ProcessSignals;
pub use strategy::{AtomicWait, LowestPendingRetry, PlatformConsume};
pub use traits::*;
pub use types::{max_signal, parse_signal, Readiness, SignalNumber, SignalSet};

/// Signal numbers (re-exported from nix)
pub use nix::sys::signal::Signal;
