/*!
 * Signal Context
 *
 * A level-triggered, consuming, pollable signal source built from a
 * passive signal observer, a software readiness event and a zero-timeout
 * consuming wait.
 *
 * The readiness event mirrors "at least one interest signal is pending".
 * Signals arrive asynchronously and no lock can order them, so every
 * de-assert is followed by a fresh pending check and, if needed, a
 * re-assert. A signal raised between the clear and the check is seen by
 * the check; one raised after the check re-fires the observer.
 */

use super::atomic_stats::{AtomicContextStats, ContextStats};
use super::process::ProcessSignals;
use super::strategy::PlatformConsume;
use super::traits::{ConsumeStrategy, EventQueue, SignalSubsystem};
use super::types::{Readiness, SignalNumber, SignalSet};
use crate::core::errors::{SignalFdError, SignalFdResult};
use nix::poll::PollFlags;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, trace, warn};

/// Emulated signal file descriptor
///
/// Borrows its event queue for `'q`; the queue must outlive the context and
/// may be shared with other contexts. `read` and `poll` may be called from
/// any number of threads; `terminate` consumes the context.
///
/// # Example
///
/// ```ignore
/// let queue = PlatformQueue::open()?;
/// let interest = SignalSet::from([Signal::SIGUSR1, Signal::SIGUSR2]);
/// interest.thread_block()?;
///
/// let ctx = SignalContext::init(&queue, &interest)?;
/// for token in queue.wait(None)? {
///     if token == ctx.token() {
///         while let Ok(signal) = ctx.read() {
///             println!("got {signal:?}");
///         }
///     }
/// }
/// ctx.terminate()?;
/// ```
pub struct SignalContext<'q, Q, S = ProcessSignals, C = PlatformConsume>
where
    Q: EventQueue,
    S: SignalSubsystem,
    C: ConsumeStrategy,
{
    interest: SignalSet,
    queue: &'q Q,
    event: Q::Event,
    lock: Mutex<()>,
    signals: S,
    stats: AtomicContextStats,
    live: bool,
    _strategy: PhantomData<fn() -> C>,
}

impl<'q, Q: EventQueue> SignalContext<'q, Q> {
    /// Create a context over the process's real signals
    pub fn init(queue: &'q Q, interest: &SignalSet) -> SignalFdResult<Self> {
        Self::with_subsystem(queue, interest, ProcessSignals::new())
    }
}

impl<'q, Q, S, C> SignalContext<'q, Q, S, C>
where
    Q: EventQueue,
    S: SignalSubsystem,
    C: ConsumeStrategy,
{
    /// Create a context over an arbitrary signal subsystem
    ///
    /// Either fully succeeds or deregisters everything it registered.
    pub fn with_subsystem(queue: &'q Q, interest: &SignalSet, signals: S) -> SignalFdResult<Self> {
        let interest = *interest;
        let lock = Mutex::new(());
        let event = queue.register()?;

        if let Err(err) = Self::arm(queue, &event, &interest, &signals) {
            if let Err(rollback) = queue.deregister(&event) {
                warn!(error = %rollback, "failed to deregister readiness event during rollback");
            }
            debug!(error = %err, "signal context init failed");
            return Err(err);
        }

        debug!(interest = ?interest, strategy = C::NAME, "signal context initialized");
        Ok(Self {
            interest,
            queue,
            event,
            lock,
            signals,
            stats: AtomicContextStats::new(),
            live: true,
            _strategy: PhantomData,
        })
    }

    /// Register observers and pick up signals that were already pending
    fn arm(queue: &Q, event: &Q::Event, interest: &SignalSet, signals: &S) -> SignalFdResult<()> {
        queue.observe(event, interest)?;

        // Already-pending signals never fire the observer
        if !signals.pending(interest)?.is_empty() {
            queue.trigger(event)?;
        }
        Ok(())
    }

    /// Consume one pending interest signal without blocking
    ///
    /// Returns [`SignalFdError::WouldBlock`] when nothing is pending.
    pub fn read(&self) -> SignalFdResult<SignalNumber> {
        let held = self.lock.lock();

        match C::consume(&self.signals, &self.interest)? {
            Some(signal) => {
                self.stats.inc_signals_read();
                self.reconcile(&held, true);
                trace!(signal = ?signal, "signal consumed");
                Ok(signal)
            }
            None => {
                self.stats.inc_would_block();
                Err(SignalFdError::WouldBlock)
            }
        }
    }

    /// Non-consuming readiness check
    ///
    /// Also re-synchronizes the readiness event with the pending set.
    pub fn poll(&self) -> bool {
        let held = self.lock.lock();
        self.stats.inc_polls();
        self.reconcile(&held, false).is_readable()
    }

    /// [`poll`](Self::poll) as a `revents` mask
    pub fn poll_events(&self) -> PollFlags {
        if self.poll() {
            PollFlags::POLLIN
        } else {
            PollFlags::empty()
        }
    }

    /// Bring the readiness event in line with the pending set
    ///
    /// The guard argument proves the context lock is held.
    fn reconcile(&self, _held: &MutexGuard<'_, ()>, just_consumed: bool) -> Readiness {
        if just_consumed && self.has_pending() {
            self.stats.inc_short_circuits();
            return Readiness::Readable;
        }

        self.queue.clear(&self.event);

        // A signal raised since the clear must be flagged again here: its
        // observer event already fired before the clear.
        if self.has_pending() {
            if let Err(err) = self.queue.trigger(&self.event) {
                warn!(error = %err, "failed to re-assert readiness event");
            }
            self.stats.inc_reasserts();
            trace!("readiness re-asserted");
            return Readiness::Readable;
        }

        Readiness::NotReadable
    }

    /// Pending check that fails towards readable
    fn has_pending(&self) -> bool {
        match self.signals.pending(&self.interest) {
            Ok(pending) => !pending.is_empty(),
            Err(err) => {
                warn!(error = %err, "pending query failed, reporting readable");
                true
            }
        }
    }

    /// Tear the context down, returning the first teardown error
    ///
    /// Both steps run even if the first fails.
    pub fn terminate(mut self) -> SignalFdResult<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> SignalFdResult<()> {
        let (deregistered, retired) = self.teardown_steps();
        deregistered.and(retired)
    }

    /// Deregister the event, then retire the lock; reports each step
    fn teardown_steps(&mut self) -> (SignalFdResult<()>, SignalFdResult<()>) {
        if !self.live {
            return (Ok(()), Ok(()));
        }
        self.live = false;

        let deregistered = self.queue.deregister(&self.event);
        let retired = if self.lock.is_locked() {
            Err(SignalFdError::Busy)
        } else {
            Ok(())
        };

        debug!(
            deregistered = deregistered.is_ok(),
            retired = retired.is_ok(),
            "signal context terminated"
        );
        (deregistered, retired)
    }

    /// Interest set copied in at construction
    #[inline]
    pub fn interest(&self) -> &SignalSet {
        &self.interest
    }

    /// Token the queue reports when this context is readable
    #[inline]
    pub fn token(&self) -> u64 {
        self.queue.token(&self.event)
    }

    /// Readiness event owned by this context
    #[inline]
    pub fn event(&self) -> &Q::Event {
        &self.event
    }

    /// Name of the compiled-in consume strategy
    #[inline]
    pub fn strategy(&self) -> &'static str {
        C::NAME
    }

    pub fn stats(&self) -> ContextStats {
        self.stats.snapshot()
    }
}

impl<Q, S, C> Drop for SignalContext<'_, Q, S, C>
where
    Q: EventQueue,
    S: SignalSubsystem,
    C: ConsumeStrategy,
{
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            warn!(error = %err, "signal context teardown on drop failed");
        }
    }
}

impl<Q, S, C> fmt::Debug for SignalContext<'_, Q, S, C>
where
    Q: EventQueue,
    S: SignalSubsystem,
    C: ConsumeStrategy,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalContext")
            .field("interest", &self.interest)
            .field("token", &self.token())
            .field("strategy", &C::NAME)
            .field("live", &self.live)
            .finish()
    }
}
