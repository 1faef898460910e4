/*!
 * Consume Strategies
 *
 * Two interchangeable ways of consuming one pending signal with a zero
 * timeout. The platform choice is fixed at compile time through
 * [`PlatformConsume`]; the context never branches on the target OS.
 */

use super::traits::{ConsumeStrategy, SignalSubsystem};
use super::types::{SignalNumber, SignalSet};
use crate::core::errors::SignalFdResult;
use tracing::trace;

/// Single atomic multi-signal wait over the whole interest set
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicWait;

impl ConsumeStrategy for AtomicWait {
    const NAME: &'static str = "atomic-wait";

    #[inline]
    fn consume<S: SignalSubsystem + ?Sized>(
        signals: &S,
        interest: &SignalSet,
    ) -> SignalFdResult<Option<SignalNumber>> {
        signals.try_consume(interest)
    }
}

/// Lowest-pending single-signal retry loop
///
/// For platforms whose consuming wait misbehaves with several signals
/// pending at once. Every iteration takes a fresh snapshot; a signal that
/// vanished between snapshot and consume restarts the loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestPendingRetry;

impl ConsumeStrategy for LowestPendingRetry {
    const NAME: &'static str = "lowest-pending-retry";

    fn consume<S: SignalSubsystem + ?Sized>(
        signals: &S,
        interest: &SignalSet,
    ) -> SignalFdResult<Option<SignalNumber>> {
        loop {
            let Some(lowest) = signals.pending(interest)?.lowest() else {
                return Ok(None);
            };

            match signals.try_consume(&SignalSet::single(lowest))? {
                Some(signal) => return Ok(Some(signal)),
                None => trace!(signal = ?lowest, "pending signal vanished, retrying"),
            }
        }
    }
}

/// Strategy for targets with an atomic zero-timeout `sigtimedwait`
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd"
))]
pub type PlatformConsume = AtomicWait;

/// Strategy for targets that can only reliably consume one signal at a time
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd"
)))]
pub type PlatformConsume = LowestPendingRetry;
