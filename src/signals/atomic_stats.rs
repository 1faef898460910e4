/*!
 * Lock-Free Context Statistics
 * Relaxed atomic counters updated from inside the context critical section
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a context's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStats {
    /// Signals consumed by `read`
    pub signals_read: u64,
    /// `read` calls that found nothing pending
    pub would_block: u64,
    /// `poll` calls
    pub polls: u64,
    /// Reconciliations that kept the event asserted without clearing it
    pub short_circuits: u64,
    /// Re-asserts after a clear because a signal was (still) pending
    pub reasserts: u64,
}

/// Atomic context statistics
///
/// # Performance
/// - Cache-line aligned to prevent false sharing between contexts
/// - Relaxed ordering; values are for monitoring only
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct AtomicContextStats {
    signals_read: AtomicU64,
    would_block: AtomicU64,
    polls: AtomicU64,
    short_circuits: AtomicU64,
    reasserts: AtomicU64,
}

impl AtomicContextStats {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn inc_signals_read(&self) {
        self.signals_read.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_would_block(&self) {
        self.would_block.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_polls(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_short_circuits(&self) {
        self.short_circuits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_reasserts(&self) {
        self.reasserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats
    ///
    /// # Note
    /// Individual values are exact, but they are not read atomically as a
    /// group.
    #[inline]
    pub fn snapshot(&self) -> ContextStats {
        ContextStats {
            signals_read: self.signals_read.load(Ordering::Relaxed),
            would_block: self.would_block.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
            short_circuits: self.short_circuits.load(Ordering::Relaxed),
            reasserts: self.reasserts.load(Ordering::Relaxed),
        }
    }
}
