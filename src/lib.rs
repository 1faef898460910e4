/*!
 * signalfd-shim
 * Level-triggered, consuming, pollable signal sources for event queues
 * whose native signal filter only observes
 */

pub mod core;
pub mod monitoring;
pub mod queue;
pub mod signals;

// Re-exports
pub use crate::core::{SignalFdError, SignalFdResult, TraceConfig, WatchConfig};
pub use monitoring::init_tracing;
pub use queue::{PlatformQueue, SoftEvent, SoftQueue};
pub use signals::{
    ConsumeStrategy, ContextStats, EventQueue, ProcessSignals, Readiness, Signal, SignalContext,
    SignalNumber, SignalSet, SignalSubsystem,
};
