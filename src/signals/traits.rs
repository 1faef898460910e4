/*!
 * Signal Traits
 * Collaborator abstractions consumed by the signal context
 */

use super::types::{SignalNumber, SignalSet};
use crate::core::errors::SignalFdResult;
use std::sync::Arc;
use std::time::Duration;

/// Event queue able to host software readiness events and passive signal
/// observers
///
/// A queue may be shared by many contexts; each registers its own events.
pub trait EventQueue: Send + Sync {
    /// Handle for one registered readiness event
    type Event: Send + Sync;

    /// Register a new readiness event, initially de-asserted
    fn register(&self) -> SignalFdResult<Self::Event>;

    /// Assert the event
    fn trigger(&self, event: &Self::Event) -> SignalFdResult<()>;

    /// De-assert the event
    fn clear(&self, event: &Self::Event);

    /// Remove the event from the queue
    fn deregister(&self, event: &Self::Event) -> SignalFdResult<()>;

    /// Register passive observers for every signal in `signals`, batched
    /// into as few kernel calls as the backend allows
    ///
    /// Observer wakeups are reported by [`EventQueue::wait`] under the
    /// token of `event`. They do not assert `event` and do not consume
    /// the signal.
    fn observe(&self, event: &Self::Event, signals: &SignalSet) -> SignalFdResult<()>;

    /// Token reported by [`EventQueue::wait`] when `event` is ready
    fn token(&self, event: &Self::Event) -> u64;

    /// Wait for ready entries, returning their tokens
    ///
    /// `None` waits indefinitely; `Some(Duration::ZERO)` polls.
    fn wait(&self, timeout: Option<Duration>) -> SignalFdResult<Vec<u64>>;
}

/// Process signal bookkeeping
pub trait SignalSubsystem: Send + Sync {
    /// Currently pending signals restricted to `within`
    fn pending(&self, within: &SignalSet) -> SignalFdResult<SignalSet>;

    /// Consume one signal from `from` with a zero timeout
    ///
    /// Returns `Ok(None)` when no member of `from` is pending.
    fn try_consume(&self, from: &SignalSet) -> SignalFdResult<Option<SignalNumber>>;
}

impl<T: SignalSubsystem + ?Sized> SignalSubsystem for Arc<T> {
    fn pending(&self, within: &SignalSet) -> SignalFdResult<SignalSet> {
        (**self).pending(within)
    }

    fn try_consume(&self, from: &SignalSet) -> SignalFdResult<Option<SignalNumber>> {
        (**self).try_consume(from)
    }
}

/// Consume strategy for one zero-timeout read
///
/// Implementations are stateless and selected at build time.
pub trait ConsumeStrategy {
    /// Strategy name for diagnostics
    const NAME: &'static str;

    /// Consume one pending member of `interest`, or `Ok(None)` if none is
    /// pending
    fn consume<S: SignalSubsystem + ?Sized>(
        signals: &S,
        interest: &SignalSet,
    ) -> SignalFdResult<Option<SignalNumber>>;
}
