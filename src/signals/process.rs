/*!
 * Process Signal Subsystem
 * Pending-set queries and zero-timeout consumption backed by the OS
 */

use super::traits::SignalSubsystem;
use super::types::{SignalNumber, SignalSet};
use crate::core::errors::{SignalFdError, SignalFdResult};
use nix::errno::Errno;
use std::mem::MaybeUninit;

/// The calling process's real signal bookkeeping
///
/// Signals must be blocked in the consuming threads, otherwise they are
/// delivered to handlers (or kill the process) before they can be read.
///
/// On Apple platforms there is no zero-timeout consuming wait, so
/// `try_consume` checks the pending set and then calls `sigwait` for a
/// signal it saw pending. If a consumer outside this crate takes that
/// signal in between, `sigwait` blocks until it is raised again.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSignals;

impl ProcessSignals {
    pub fn new() -> Self {
        Self
    }

    /// Everything pending for the calling thread or the process
    pub fn pending_all(&self) -> SignalFdResult<SignalSet> {
        let mut raw = MaybeUninit::<libc::sigset_t>::uninit();
        // SAFETY: sigpending fills the whole set on success.
        let rc = unsafe { libc::sigpending(raw.as_mut_ptr()) };
        if rc < 0 {
            return Err(SignalFdError::last_os_error());
        }
        // SAFETY: initialized by the successful call above.
        let raw = unsafe { raw.assume_init() };
        Ok(SignalSet::from_raw(raw))
    }
}

impl SignalSubsystem for ProcessSignals {
    fn pending(&self, within: &SignalSet) -> SignalFdResult<SignalSet> {
        Ok(self.pending_all()?.intersection(within))
    }

    fn try_consume(&self, from: &SignalSet) -> SignalFdResult<Option<SignalNumber>> {
        consume_now(self, from)
    }
}

/// Signal numbers returned by the kernel are always valid
fn delivered(signo: libc::c_int) -> SignalNumber {
    SignalNumber::new_unchecked(signo)
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd"
))]
fn consume_now(_signals: &ProcessSignals, from: &SignalSet) -> SignalFdResult<Option<SignalNumber>> {
    // SAFETY: all-zero is a valid timespec.
    let zero: libc::timespec = unsafe { std::mem::zeroed() };
    loop {
        // SAFETY: `from` is a valid set, info may be null, `zero` outlives the call.
        let signo = unsafe { libc::sigtimedwait(from.as_raw(), std::ptr::null_mut(), &zero) };
        if signo >= 0 {
            return Ok(Some(delivered(signo)));
        }
        match Errno::last() {
            Errno::EAGAIN => return Ok(None),
            Errno::EINTR => continue,
            errno => return Err(errno.into()),
        }
    }
}

#[cfg(target_os = "openbsd")]
fn consume_now(_signals: &ProcessSignals, from: &SignalSet) -> SignalFdResult<Option<SignalNumber>> {
    extern "C" {
        fn __thrsigdivert(
            set: libc::sigset_t,
            info: *mut libc::siginfo_t,
            timeout: *const libc::timespec,
        ) -> libc::c_int;
    }

    // A zero timespec returns EAGAIN but logs to dmesg; an invalid one
    // fails fast with EINVAL instead.
    // SAFETY: all-zero is a valid timespec.
    let mut invalid: libc::timespec = unsafe { std::mem::zeroed() };
    invalid.tv_nsec = -1;
    // SAFETY: plain value set, null info, timespec outlives the call.
    let signo = unsafe { __thrsigdivert(*from.as_raw(), std::ptr::null_mut(), &invalid) };
    if signo >= 0 {
        return Ok(Some(delivered(signo)));
    }
    match Errno::last() {
        Errno::EINVAL | Errno::EAGAIN | Errno::EINTR => Ok(None),
        errno => Err(errno.into()),
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd"
)))]
fn consume_now(signals: &ProcessSignals, from: &SignalSet) -> SignalFdResult<Option<SignalNumber>> {
    // No zero-timeout wait here: only call sigwait for a signal known to be
    // pending, so it returns immediately. A consumer outside this crate
    // taking the signal in between makes sigwait block.
    let Some(lowest) = signals.pending(from)?.lowest() else {
        return Ok(None);
    };
    let single = SignalSet::single(lowest);
    let mut signo: libc::c_int = 0;
    // SAFETY: valid set and out-pointer.
    let rc = unsafe { libc::sigwait(single.as_raw(), &mut signo) };
    if rc != 0 {
        return Err(Errno::from_raw(rc).into());
    }
    Ok(Some(delivered(signo)))
}
