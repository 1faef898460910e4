/*!
 * Signal Context Tests
 * Readiness protocol, lifecycle and error handling over test doubles
 */

use super::common::{FakeSignals, FaultyQueue};
use nix::errno::Errno;
use pretty_assertions::assert_eq;
use signalfd_shim::signals::{AtomicWait, ConsumeStrategy, LowestPendingRetry};
use signalfd_shim::{
    EventQueue, Signal, SignalContext, SignalFdError, SignalNumber, SignalSet, SoftQueue,
};
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

type FakeContext<'q, Q, C> = SignalContext<'q, Q, Arc<FakeSignals>, C>;

fn usr_interest() -> SignalSet {
    SignalSet::from([Signal::SIGUSR1, Signal::SIGUSR2])
}

fn two_signals_drain_lowest_first<C: ConsumeStrategy>() {
    let queue = SoftQueue::new();
    let signals = FakeSignals::new();
    let ctx = FakeContext::<_, C>::with_subsystem(&queue, &usr_interest(), signals.clone())
        .unwrap();

    signals.raise(Signal::SIGUSR1);
    signals.raise(Signal::SIGUSR2);

    assert!(ctx.poll());
    assert_eq!(ctx.read().unwrap(), Signal::SIGUSR1);
    assert!(ctx.poll());
    assert_eq!(ctx.read().unwrap(), Signal::SIGUSR2);
    assert!(!ctx.poll());
    assert_eq!(ctx.read(), Err(SignalFdError::WouldBlock));

    ctx.terminate().unwrap();
    assert_eq!(queue.registered(), 0);
}

fn nothing_pending_would_block<C: ConsumeStrategy>() {
    let queue = SoftQueue::new();
    let signals = FakeSignals::new();
    let interest = SignalSet::single(Signal::SIGUSR1);
    let ctx = FakeContext::<_, C>::with_subsystem(&queue, &interest, signals).unwrap();

    assert!(!ctx.poll());
    assert!(ctx.read().unwrap_err().is_would_block());
    assert!(!queue.is_asserted(ctx.event()));
}

#[test]
fn test_two_signals_drain_lowest_first_atomic_wait() {
    two_signals_drain_lowest_first::<AtomicWait>();
}

#[test]
fn test_two_signals_drain_lowest_first_lowest_pending_retry() {
    two_signals_drain_lowest_first::<LowestPendingRetry>();
}

#[test]
fn test_nothing_pending_would_block_atomic_wait() {
    nothing_pending_would_block::<AtomicWait>();
}

#[test]
fn test_nothing_pending_would_block_lowest_pending_retry() {
    nothing_pending_would_block::<LowestPendingRetry>();
}

#[test]
fn test_signal_pending_before_init_is_readable() {
    let queue = SoftQueue::new();
    let signals = FakeSignals::new();
    signals.raise(Signal::SIGUSR2);

    let ctx = FakeContext::<_, AtomicWait>::with_subsystem(&queue, &usr_interest(), signals)
        .unwrap();

    // Asserted by init itself, before any poll
    assert!(queue.is_asserted(ctx.event()));
    assert!(ctx.poll());
    assert_eq!(ctx.read().unwrap(), Signal::SIGUSR2);
}

#[test]
fn test_pending_outside_interest_is_ignored() {
    let queue = SoftQueue::new();
    let signals = FakeSignals::new();
    signals.raise(Signal::SIGHUP);

    let ctx = FakeContext::<_, AtomicWait>::with_subsystem(&queue, &usr_interest(), signals.clone())
        .unwrap();

    assert!(!queue.is_asserted(ctx.event()));
    assert!(!ctx.poll());
    assert!(ctx.read().unwrap_err().is_would_block());
    assert!(signals.pending_now().contains(Signal::SIGHUP));
}

#[test]
fn test_signal_raised_between_clear_and_recheck_during_poll() {
    let queue = FaultyQueue::new();
    let signals = FakeSignals::new();
    let ctx = FakeContext::<_, AtomicWait>::with_subsystem(&queue, &usr_interest(), signals.clone())
        .unwrap();
    assert!(!ctx.poll());

    let raiser = signals.clone();
    queue.after_next_clear(move || raiser.raise(Signal::SIGUSR1));

    assert!(ctx.poll());
    assert!(queue.inner.is_asserted(ctx.event()));
    assert_eq!(ctx.stats().reasserts, 1);
    assert_eq!(ctx.read().unwrap(), Signal::SIGUSR1);
}

#[test]
fn test_signal_raised_between_clear_and_recheck_during_read() {
    let queue = FaultyQueue::new();
    let signals = FakeSignals::new();
    signals.raise(Signal::SIGUSR1);
    let ctx = FakeContext::<_, AtomicWait>::with_subsystem(&queue, &usr_interest(), signals.clone())
        .unwrap();

    // Nothing left after consuming USR1, so read clears; USR2 lands right then
    let raiser = signals.clone();
    queue.after_next_clear(move || raiser.raise(Signal::SIGUSR2));

    assert_eq!(ctx.read().unwrap(), Signal::SIGUSR1);
    assert!(queue.inner.is_asserted(ctx.event()));

    let ready = queue.wait(Some(std::time::Duration::ZERO)).unwrap();
    assert_eq!(ready, vec![ctx.token()]);
    assert_eq!(ctx.read().unwrap(), Signal::SIGUSR2);
    assert!(!queue.inner.is_asserted(ctx.event()));
}

#[test]
fn test_read_with_more_pending_skips_clear() {
    let queue = FaultyQueue::new();
    let signals = FakeSignals::new();
    signals.raise(Signal::SIGUSR1);
    signals.raise(Signal::SIGUSR2);
    let ctx = FakeContext::<_, AtomicWait>::with_subsystem(&queue, &usr_interest(), signals)
        .unwrap();

    assert_eq!(ctx.read().unwrap(), Signal::SIGUSR1);
    assert_eq!(queue.clear_calls.load(Ordering::SeqCst), 0);
    assert!(queue.inner.is_asserted(ctx.event()));

    assert_eq!(ctx.read().unwrap(), Signal::SIGUSR2);
    assert_eq!(queue.clear_calls.load(Ordering::SeqCst), 1);
    assert!(!queue.inner.is_asserted(ctx.event()));
}

#[test]
fn test_poll_is_idempotent_and_non_consuming() {
    let queue = SoftQueue::new();
    let signals = FakeSignals::new();
    signals.raise(Signal::SIGUSR2);
    signals.raise(Signal::SIGUSR1);
    let ctx = FakeContext::<_, AtomicWait>::with_subsystem(&queue, &usr_interest(), signals.clone())
        .unwrap();

    for _ in 0..5 {
        assert!(ctx.poll());
    }
    assert_eq!(signals.pending_now(), usr_interest());
    assert_eq!(ctx.stats().polls, 5);

    assert_eq!(ctx.read().unwrap(), Signal::SIGUSR1);
    assert_eq!(ctx.read().unwrap(), Signal::SIGUSR2);
    assert!(!ctx.poll());
    assert!(!ctx.poll());
}

#[test]
fn test_would_block_leaves_event_untouched() {
    let queue = SoftQueue::new();
    let signals = FakeSignals::new();
    let ctx = FakeContext::<_, AtomicWait>::with_subsystem(&queue, &usr_interest(), signals)
        .unwrap();

    // Stale assertion, e.g. another consumer took the signal
    queue.trigger(ctx.event()).unwrap();

    assert!(ctx.read().unwrap_err().is_would_block());
    assert!(queue.is_asserted(ctx.event()));

    // The next poll reconciles it away
    assert!(!ctx.poll());
    assert!(!queue.is_asserted(ctx.event()));
}

#[test]
fn test_hard_consume_error_propagates() {
    let queue = SoftQueue::new();
    let signals = FakeSignals::new();
    signals.raise(Signal::SIGUSR1);
    let ctx = FakeContext::<_, LowestPendingRetry>::with_subsystem(
        &queue,
        &usr_interest(),
        signals.clone(),
    )
    .unwrap();

    signals.fail_consume(Some(SignalFdError::InvalidArgument));
    assert_eq!(ctx.read(), Err(SignalFdError::InvalidArgument));
    // Nothing consumed, readiness kept
    assert!(signals.pending_now().contains(Signal::SIGUSR1));
    assert!(queue.is_asserted(ctx.event()));

    signals.fail_consume(None);
    assert_eq!(ctx.read().unwrap(), Signal::SIGUSR1);
}

#[test]
fn test_pending_query_failure_reports_readable() {
    let queue = SoftQueue::new();
    let signals = FakeSignals::new();
    let ctx = FakeContext::<_, AtomicWait>::with_subsystem(&queue, &usr_interest(), signals.clone())
        .unwrap();

    signals.fail_pending(true);
    assert!(ctx.poll());
    assert!(queue.is_asserted(ctx.event()));

    signals.fail_pending(false);
    assert!(!ctx.poll());
}

#[test]
fn test_init_rollback_on_register_failure() {
    let queue = FaultyQueue::new();
    queue.fail_register.store(true, Ordering::SeqCst);

    let result =
        FakeContext::<_, AtomicWait>::with_subsystem(&queue, &usr_interest(), FakeSignals::new());
    assert_eq!(
        result.unwrap_err(),
        SignalFdError::ResourceExhausted(Errno::ENOMEM)
    );
    assert_eq!(queue.inner.registered(), 0);
    assert_eq!(queue.observe_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_init_rollback_on_observe_failure() {
    let queue = FaultyQueue::new();
    queue.fail_observe.store(true, Ordering::SeqCst);

    let result =
        FakeContext::<_, AtomicWait>::with_subsystem(&queue, &usr_interest(), FakeSignals::new());
    assert!(result.is_err());
    assert_eq!(queue.inner.registered(), 0);
    assert_eq!(queue.deregister_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_init_rollback_on_pending_query_failure() {
    let queue = FaultyQueue::new();
    let signals = FakeSignals::new();
    signals.fail_pending(true);

    let result = FakeContext::<_, AtomicWait>::with_subsystem(&queue, &usr_interest(), signals);
    assert_eq!(result.unwrap_err(), SignalFdError::Os(Errno::EIO));
    assert_eq!(queue.inner.registered(), 0);
}

#[test]
fn test_init_rollback_on_trigger_failure() {
    let queue = FaultyQueue::new();
    queue.fail_trigger.store(true, Ordering::SeqCst);
    let signals = FakeSignals::new();
    signals.raise(Signal::SIGUSR1);

    let result = FakeContext::<_, AtomicWait>::with_subsystem(&queue, &usr_interest(), signals);
    assert!(result.is_err());
    assert_eq!(queue.inner.registered(), 0);
    assert_eq!(queue.deregister_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_init_observes_whole_interest_set_in_one_call() {
    let queue = FaultyQueue::new();
    let interest = SignalSet::from([Signal::SIGHUP, Signal::SIGUSR1, Signal::SIGTERM]);
    let _ctx = FakeContext::<_, AtomicWait>::with_subsystem(&queue, &interest, FakeSignals::new())
        .unwrap();

    assert_eq!(queue.observe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(queue.inner.observed(), interest);
}

#[test]
fn test_terminate_attempts_deregister_and_reports_failure() {
    let queue = FaultyQueue::new();
    let ctx = FakeContext::<_, AtomicWait>::with_subsystem(&queue, &usr_interest(), FakeSignals::new())
        .unwrap();

    queue.fail_deregister.store(true, Ordering::SeqCst);
    assert_eq!(
        ctx.terminate(),
        Err(SignalFdError::ResourceExhausted(Errno::ENOMEM))
    );
    // Exactly one attempt: drop after terminate does not retry
    assert_eq!(queue.deregister_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_contexts_share_one_queue() {
    let queue = SoftQueue::new();
    let signals = FakeSignals::new();
    let first = FakeContext::<_, AtomicWait>::with_subsystem(
        &queue,
        &SignalSet::single(Signal::SIGUSR1),
        signals.clone(),
    )
    .unwrap();
    let second = FakeContext::<_, AtomicWait>::with_subsystem(
        &queue,
        &SignalSet::single(Signal::SIGUSR2),
        signals.clone(),
    )
    .unwrap();
    assert_ne!(first.token(), second.token());

    signals.raise(Signal::SIGUSR2);
    assert!(!first.poll());
    assert!(second.poll());

    let ready = queue.wait(Some(std::time::Duration::ZERO)).unwrap();
    assert_eq!(ready, vec![second.token()]);

    assert!(first.read().unwrap_err().is_would_block());
    assert_eq!(second.read().unwrap(), Signal::SIGUSR2);

    first.terminate().unwrap();
    assert_eq!(queue.registered(), 1);
    second.terminate().unwrap();
    assert_eq!(queue.registered(), 0);
}

#[test]
fn test_concurrent_readers_consume_each_signal_once() {
    let interest = SignalSet::from([
        Signal::SIGHUP,
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGUSR1,
        Signal::SIGUSR2,
        Signal::SIGALRM,
        Signal::SIGTERM,
        Signal::SIGWINCH,
    ]);
    let queue = SoftQueue::new();
    let signals = FakeSignals::new();
    for signal in interest.iter() {
        signals.raise(signal);
    }
    let ctx = FakeContext::<_, LowestPendingRetry>::with_subsystem(&queue, &interest, signals)
        .unwrap();

    let consumed: Vec<SignalNumber> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let mut mine = Vec::new();
                    while let Ok(signal) = ctx.read() {
                        mine.push(signal);
                    }
                    mine
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    let unique: BTreeSet<i32> = consumed.iter().map(|s| s.raw()).collect();
    let expected: BTreeSet<i32> = interest.iter().map(|s| s.raw()).collect();
    assert_eq!(consumed.len(), interest.len());
    assert_eq!(unique, expected);
    assert!(!ctx.poll());
    assert!(!queue.is_asserted(ctx.event()));
    assert_eq!(ctx.stats().signals_read, interest.len() as u64);
}

#[test]
fn test_poll_events_reports_pollin() {
    let queue = SoftQueue::new();
    let signals = FakeSignals::new();
    let ctx = FakeContext::<_, AtomicWait>::with_subsystem(&queue, &usr_interest(), signals.clone())
        .unwrap();

    assert!(ctx.poll_events().is_empty());
    signals.raise(Signal::SIGUSR1);
    assert_eq!(ctx.poll_events(), nix::poll::PollFlags::POLLIN);
}
