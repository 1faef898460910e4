/*!
 * Core Module
 * Error handling and runtime configuration
 */

pub mod config;
pub mod errors;

// Re-export for convenience
pub use config::{TraceConfig, WatchConfig};
pub use errors::*;
