/*!
 * Observer Ownership
 *
 * Bookkeeping for queues whose kernel signal filter is keyed by signal
 * number alone, so one kernel observer serves every context on the queue
 * that watches that signal.
 */

use std::collections::BTreeMap;

/// Signal number -> tokens of the contexts observing it
#[derive(Debug, Default)]
pub(crate) struct ObserverOwners {
    by_signal: BTreeMap<i32, Vec<u64>>,
}

impl ObserverOwners {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record `token` as an owner of every signal in `signals`
    ///
    /// Returns the signals that had no owner before, which need a kernel
    /// observer added.
    pub(crate) fn claim(&mut self, token: u64, signals: impl IntoIterator<Item = i32>) -> Vec<i32> {
        let mut fresh = Vec::new();
        for signo in signals {
            let owners = self.by_signal.entry(signo).or_default();
            if owners.is_empty() {
                fresh.push(signo);
            }
            if !owners.contains(&token) {
                owners.push(token);
            }
        }
        fresh
    }

    /// Drop `token` from every signal it owns
    ///
    /// Returns the signals left without owners, whose kernel observers
    /// should be deleted.
    pub(crate) fn release(&mut self, token: u64) -> Vec<i32> {
        let mut orphaned = Vec::new();
        self.by_signal.retain(|signo, owners| {
            owners.retain(|owner| *owner != token);
            if owners.is_empty() {
                orphaned.push(*signo);
                false
            } else {
                true
            }
        });
        orphaned
    }

    /// Tokens to report when `signo` fires
    pub(crate) fn owners(&self, signo: i32) -> &[u64] {
        self.by_signal.get(&signo).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of signals with at least one owner
    #[cfg(test)]
    pub(crate) fn observed(&self) -> usize {
        self.by_signal.len()
    }
}
