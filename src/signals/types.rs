/*!
 * Signal Types
 * Signal numbers, interest sets, pending snapshots and readiness state
 */

use crate::core::errors::{SignalFdError, SignalFdResult};
use nix::sys::signal::{SigSet, Signal};
use std::fmt;
use std::mem::MaybeUninit;
use std::str::FromStr;

/// Highest signal number the platform's signal sets can hold
#[cfg(target_os = "linux")]
pub fn max_signal() -> i32 {
    libc::SIGRTMAX()
}

#[cfg(target_os = "android")]
pub fn max_signal() -> i32 {
    64
}

#[cfg(any(target_os = "freebsd", target_os = "dragonfly"))]
pub fn max_signal() -> i32 {
    128
}

#[cfg(target_os = "netbsd")]
pub fn max_signal() -> i32 {
    63
}

#[cfg(target_os = "openbsd")]
pub fn max_signal() -> i32 {
    32
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd"
)))]
pub fn max_signal() -> i32 {
    31
}

/// Platform signal number
///
/// Covers every signal the platform can queue, including real-time
/// signals that have no [`Signal`] variant.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalNumber(i32);

impl SignalNumber {
    /// Number known to be in `1..=max_signal()`
    #[inline]
    pub(crate) const fn new_unchecked(raw: i32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Standard signal, if this number has a name
    pub fn as_signal(self) -> Option<Signal> {
        Signal::try_from(self.0).ok()
    }
}

impl From<Signal> for SignalNumber {
    fn from(signal: Signal) -> Self {
        Self(signal as i32)
    }
}

impl TryFrom<i32> for SignalNumber {
    type Error = SignalFdError;

    fn try_from(raw: i32) -> SignalFdResult<Self> {
        if (1..=max_signal()).contains(&raw) {
            Ok(Self(raw))
        } else {
            Err(SignalFdError::InvalidArgument)
        }
    }
}

impl TryFrom<SignalNumber> for Signal {
    type Error = SignalFdError;

    fn try_from(number: SignalNumber) -> SignalFdResult<Self> {
        Signal::try_from(number.0).map_err(SignalFdError::from)
    }
}

impl PartialEq<Signal> for SignalNumber {
    fn eq(&self, other: &Signal) -> bool {
        self.0 == *other as i32
    }
}

impl fmt::Display for SignalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(signal) = self.as_signal() {
            return f.write_str(signal.as_str());
        }
        match realtime_offset(self.0) {
            Some(offset) => write!(f, "SIGRTMIN+{}", offset),
            None => write!(f, "signal {}", self.0),
        }
    }
}

impl fmt::Debug for SignalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Set of signal numbers
///
/// Used both as a context's interest set (copied in at construction and
/// never mutated afterwards) and as the ephemeral pending snapshot.
/// Iteration is always in ascending signal-number order.
#[derive(Clone, Copy)]
pub struct SignalSet {
    raw: libc::sigset_t,
}

// SAFETY (all sig*set calls below): `raw` is always initialized by
// sigemptyset or copied from an initialized set, and every number passed
// is in `1..=max_signal()`.
impl SignalSet {
    pub fn empty() -> Self {
        let mut raw = MaybeUninit::<libc::sigset_t>::uninit();
        unsafe { libc::sigemptyset(raw.as_mut_ptr()) };
        Self {
            raw: unsafe { raw.assume_init() },
        }
    }

    /// Set holding a single signal
    pub fn single(signal: impl Into<SignalNumber>) -> Self {
        let mut set = Self::empty();
        set.insert(signal);
        set
    }

    #[inline]
    pub fn insert(&mut self, signal: impl Into<SignalNumber>) {
        unsafe { libc::sigaddset(&mut self.raw, signal.into().raw()) };
    }

    #[inline]
    pub fn remove(&mut self, signal: impl Into<SignalNumber>) {
        unsafe { libc::sigdelset(&mut self.raw, signal.into().raw()) };
    }

    #[inline]
    pub fn contains(&self, signal: impl Into<SignalNumber>) -> bool {
        unsafe { libc::sigismember(&self.raw, signal.into().raw()) == 1 }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Members in ascending numeric order
    pub fn iter(&self) -> impl Iterator<Item = SignalNumber> {
        let raw = self.raw;
        (1..=max_signal())
            .filter(move |signo| unsafe { libc::sigismember(&raw, *signo) == 1 })
            .map(SignalNumber::new_unchecked)
    }

    /// Lowest-numbered member
    pub fn lowest(&self) -> Option<SignalNumber> {
        self.iter().next()
    }

    pub fn intersection(&self, other: &SignalSet) -> SignalSet {
        self.iter().filter(|signal| other.contains(*signal)).collect()
    }

    /// Block every member for the calling thread
    pub fn thread_block(&self) -> SignalFdResult<()> {
        self.thread_mask(libc::SIG_BLOCK)
    }

    /// Unblock every member for the calling thread
    pub fn thread_unblock(&self) -> SignalFdResult<()> {
        self.thread_mask(libc::SIG_UNBLOCK)
    }

    fn thread_mask(&self, how: libc::c_int) -> SignalFdResult<()> {
        // SAFETY: valid set; the old mask is not requested.
        let rc = unsafe { libc::pthread_sigmask(how, &self.raw, std::ptr::null_mut()) };
        if rc != 0 {
            return Err(nix::errno::Errno::from_raw(rc).into());
        }
        Ok(())
    }

    /// Borrow as the raw libc set passed to syscalls
    #[inline]
    pub(crate) fn as_raw(&self) -> &libc::sigset_t {
        &self.raw
    }

    /// Wrap a raw libc set filled by the kernel
    pub(crate) fn from_raw(raw: libc::sigset_t) -> SignalSet {
        // Re-collect so bits outside the valid range never leak through
        Self { raw }.iter().collect()
    }
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for SignalSet {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for SignalSet {}

impl fmt::Debug for SignalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: Into<SignalNumber>> FromIterator<T> for SignalSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = SignalSet::empty();
        for signal in iter {
            set.insert(signal);
        }
        set
    }
}

impl<T: Into<SignalNumber> + Copy> From<&[T]> for SignalSet {
    fn from(signals: &[T]) -> Self {
        signals.iter().copied().collect()
    }
}

impl<T: Into<SignalNumber>, const N: usize> From<[T; N]> for SignalSet {
    fn from(signals: [T; N]) -> Self {
        signals.into_iter().collect()
    }
}

impl From<SigSet> for SignalSet {
    fn from(set: SigSet) -> Self {
        Self::from_raw(*set.as_ref())
    }
}

/// Parse a signal name or number
///
/// Accepts `SIGUSR1`, `usr1`, `10` and, on Linux, `SIGRTMIN+3` /
/// `RTMAX-1`.
pub fn parse_signal(name: &str) -> SignalFdResult<SignalNumber> {
    let unknown = || SignalFdError::UnknownSignal(name.to_string());
    let upper = name.trim().to_ascii_uppercase();
    let bare = upper.strip_prefix("SIG").unwrap_or(&upper);

    if let Ok(raw) = bare.parse::<i32>() {
        return SignalNumber::try_from(raw).map_err(|_| unknown());
    }

    if let Some(number) = parse_realtime(bare) {
        return SignalNumber::try_from(number).map_err(|_| unknown());
    }

    Signal::from_str(&format!("SIG{}", bare))
        .map(SignalNumber::from)
        .map_err(|_| unknown())
}

#[cfg(target_os = "linux")]
fn parse_realtime(bare: &str) -> Option<i32> {
    let offset = |rest: &str| -> Option<i32> {
        if rest.is_empty() {
            Some(0)
        } else {
            rest.parse::<i32>().ok()
        }
    };
    if let Some(rest) = bare.strip_prefix("RTMIN") {
        return offset(rest.strip_prefix('+').unwrap_or(rest)).map(|n| libc::SIGRTMIN() + n);
    }
    if let Some(rest) = bare.strip_prefix("RTMAX") {
        return offset(rest.strip_prefix('-').unwrap_or(rest)).map(|n| libc::SIGRTMAX() - n);
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn parse_realtime(_bare: &str) -> Option<i32> {
    None
}

#[cfg(target_os = "linux")]
fn realtime_offset(signo: i32) -> Option<i32> {
    (signo >= libc::SIGRTMIN()).then(|| signo - libc::SIGRTMIN())
}

#[cfg(not(target_os = "linux"))]
fn realtime_offset(_signo: i32) -> Option<i32> {
    None
}

/// Logical readiness of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// At least one interest signal is pending
    Readable,
    /// Nothing in the interest set is pending
    NotReadable,
}

impl Readiness {
    #[inline]
    pub fn is_readable(&self) -> bool {
        matches!(self, Readiness::Readable)
    }
}

impl From<bool> for Readiness {
    fn from(readable: bool) -> Self {
        if readable {
            Readiness::Readable
        } else {
            Readiness::NotReadable
        }
    }
}
