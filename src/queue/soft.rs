/*!
 * Software Event Queue
 *
 * Portable in-memory queue with level-triggered readiness events.
 * Has no kernel signal observers: `observe` only records the interest, so
 * readiness changes come solely from `trigger` / `clear`.
 */

use crate::core::errors::{SignalFdError, SignalFdResult};
use crate::signals::{EventQueue, SignalSet};
use nix::errno::Errno;
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Readiness event registered on a [`SoftQueue`]
#[derive(Debug)]
pub struct SoftEvent {
    token: u64,
}

#[derive(Debug, Default)]
struct SoftState {
    next_token: u64,
    /// token -> asserted
    events: BTreeMap<u64, bool>,
    observed: SignalSet,
}

impl SoftState {
    fn asserted(&self) -> Vec<u64> {
        self.events
            .iter()
            .filter(|(_, asserted)| **asserted)
            .map(|(token, _)| *token)
            .collect()
    }
}

/// In-memory event queue
#[derive(Debug, Default)]
pub struct SoftQueue {
    state: Mutex<SoftState>,
    ready: Condvar,
}

impl SoftQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Infallible; mirrors the native backends' constructors
    pub fn open() -> SignalFdResult<Self> {
        Ok(Self::new())
    }

    /// Whether `event` is currently asserted
    pub fn is_asserted(&self, event: &SoftEvent) -> bool {
        self.state
            .lock()
            .events
            .get(&event.token)
            .copied()
            .unwrap_or(false)
    }

    /// Number of live readiness events
    pub fn registered(&self) -> usize {
        self.state.lock().events.len()
    }

    /// Union of every signal set passed to `observe`
    pub fn observed(&self) -> SignalSet {
        self.state.lock().observed
    }

    fn with_event<T>(
        &self,
        event: &SoftEvent,
        f: impl FnOnce(&mut bool) -> T,
    ) -> SignalFdResult<T> {
        let mut state = self.state.lock();
        state
            .events
            .get_mut(&event.token)
            .map(f)
            .ok_or(SignalFdError::Os(Errno::ENOENT))
    }
}

impl EventQueue for SoftQueue {
    type Event = SoftEvent;

    fn register(&self) -> SignalFdResult<SoftEvent> {
        let mut state = self.state.lock();
        state.next_token += 1;
        let token = state.next_token;
        state.events.insert(token, false);
        Ok(SoftEvent { token })
    }

    fn trigger(&self, event: &SoftEvent) -> SignalFdResult<()> {
        self.with_event(event, |asserted| *asserted = true)?;
        self.ready.notify_all();
        Ok(())
    }

    fn clear(&self, event: &SoftEvent) {
        let _ = self.with_event(event, |asserted| *asserted = false);
    }

    fn deregister(&self, event: &SoftEvent) -> SignalFdResult<()> {
        self.state
            .lock()
            .events
            .remove(&event.token)
            .map(|_| ())
            .ok_or(SignalFdError::Os(Errno::ENOENT))
    }

    fn observe(&self, event: &SoftEvent, signals: &SignalSet) -> SignalFdResult<()> {
        let mut state = self.state.lock();
        if !state.events.contains_key(&event.token) {
            return Err(SignalFdError::Os(Errno::ENOENT));
        }
        for signal in signals.iter() {
            state.observed.insert(signal);
        }
        Ok(())
    }

    fn token(&self, event: &SoftEvent) -> u64 {
        event.token
    }

    fn wait(&self, timeout: Option<Duration>) -> SignalFdResult<Vec<u64>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            let ready = state.asserted();
            if !ready.is_empty() {
                return Ok(ready);
            }
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut state, deadline).timed_out() {
                        return Ok(state.asserted());
                    }
                }
                None => self.ready.wait(&mut state),
            }
        }
    }
}
