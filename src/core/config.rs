/*!
 * Runtime Configuration
 *
 * Environment-driven settings for tracing and the sigwatch binary
 */

use crate::core::errors::SignalFdResult;
use crate::signals::{parse_signal, Signal, SignalNumber, SignalSet};
use std::time::Duration;

/// Environment variable enabling JSON trace output
pub const TRACE_JSON_ENV: &str = "SIGNALFD_TRACE_JSON";

/// Environment variable overriding the sigwatch idle timeout
pub const WATCH_TIMEOUT_ENV: &str = "SIGWATCH_TIMEOUT_MS";

/// Tracing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Emit JSON instead of compact human-readable lines
    pub json: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            json: false,
        }
    }
}

impl TraceConfig {
    /// Read `SIGNALFD_TRACE_JSON` (`1` or `true` enables JSON)
    pub fn from_env() -> Self {
        let json = std::env::var(TRACE_JSON_ENV)
            .map(|v| is_truthy(&v))
            .unwrap_or(false);
        Self {
            json,
            ..Self::default()
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "yes")
}

/// sigwatch configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Signals to block and consume
    pub signals: SignalSet,
    /// Consuming any of these ends the watch loop
    pub exit_on: SignalSet,
    /// Queue wait timeout between idle heartbeats
    pub timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            signals: SignalSet::from([
                Signal::SIGHUP,
                Signal::SIGINT,
                Signal::SIGTERM,
                Signal::SIGUSR1,
                Signal::SIGUSR2,
            ]),
            exit_on: SignalSet::from([Signal::SIGINT, Signal::SIGTERM]),
            timeout: Duration::from_millis(1000),
        }
    }
}

impl WatchConfig {
    /// Build from signal-name arguments, falling back to the default set
    ///
    /// `SIGWATCH_TIMEOUT_MS` overrides the idle timeout.
    pub fn from_args<I, A>(args: I) -> SignalFdResult<Self>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        let mut config = Self::default();

        let named = args
            .into_iter()
            .map(|arg| parse_signal(arg.as_ref()))
            .collect::<SignalFdResult<Vec<SignalNumber>>>()?;
        if !named.is_empty() {
            config.signals = named.into_iter().collect();
        }

        if let Some(ms) = std::env::var(WATCH_TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Exit signals that are actually being watched
    pub fn effective_exit_on(&self) -> SignalSet {
        self.exit_on.intersection(&self.signals)
    }
}
