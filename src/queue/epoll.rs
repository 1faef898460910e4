/*!
 * Epoll Event Queue
 *
 * Readiness events are non-blocking eventfds watched level-triggered.
 * Signal observers are signalfds watched edge-triggered and never read, so
 * they report arrivals without consuming anything.
 */

use crate::core::errors::{SignalFdError, SignalFdResult};
use crate::signals::{EventQueue, SignalSet};
use nix::errno::Errno;
use parking_lot::Mutex;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;
use tracing::trace;

const WAIT_BATCH: usize = 32;

/// Readiness event registered on an [`Epoll`] queue
#[derive(Debug)]
pub struct EpollEvent {
    fd: OwnedFd,
}

/// Epoll-backed event queue
#[derive(Debug)]
pub struct Epoll {
    fd: OwnedFd,
    /// (owning event token, signalfd)
    observers: Mutex<Vec<(u64, OwnedFd)>>,
}

fn cvt(rc: libc::c_int) -> SignalFdResult<libc::c_int> {
    if rc < 0 {
        Err(SignalFdError::last_os_error())
    } else {
        Ok(rc)
    }
}

/// Wrap a freshly created descriptor
fn owned(raw: libc::c_int) -> SignalFdResult<OwnedFd> {
    let raw = cvt(raw)?;
    // SAFETY: `raw` was just returned by the kernel and is owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

impl Epoll {
    pub fn open() -> SignalFdResult<Self> {
        // SAFETY: plain syscall.
        let fd = owned(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
        Ok(Self {
            fd,
            observers: Mutex::new(Vec::new()),
        })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, events: u32, token: u64) -> SignalFdResult<()> {
        let mut event = libc::epoll_event { events, u64: token };
        // SAFETY: both descriptors are valid for the duration of the call.
        cvt(unsafe { libc::epoll_ctl(self.fd.as_raw_fd(), op, fd, &mut event) })?;
        Ok(())
    }
}

impl EventQueue for Epoll {
    type Event = EpollEvent;

    fn register(&self) -> SignalFdResult<EpollEvent> {
        // SAFETY: plain syscall.
        let fd = owned(unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) })?;
        let token = fd.as_raw_fd() as u64;
        self.ctl(libc::EPOLL_CTL_ADD, fd.as_raw_fd(), libc::EPOLLIN as u32, token)?;
        Ok(EpollEvent { fd })
    }

    fn trigger(&self, event: &EpollEvent) -> SignalFdResult<()> {
        let one: u64 = 1;
        // SAFETY: writes 8 bytes from a live u64.
        let n = unsafe {
            libc::write(
                event.fd.as_raw_fd(),
                &one as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if n < 0 {
            match Errno::last() {
                // Counter saturated: already readable
                Errno::EAGAIN => return Ok(()),
                errno => return Err(errno.into()),
            }
        }
        Ok(())
    }

    fn clear(&self, event: &EpollEvent) {
        let mut counter: u64 = 0;
        // SAFETY: reads at most 8 bytes into a live u64. EAGAIN means the
        // counter was already zero.
        let _ = unsafe {
            libc::read(
                event.fd.as_raw_fd(),
                &mut counter as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
    }

    fn deregister(&self, event: &EpollEvent) -> SignalFdResult<()> {
        let token = self.token(event);
        let removed: Vec<OwnedFd> = {
            let mut observers = self.observers.lock();
            let (removed, kept): (Vec<_>, Vec<_>) = observers
                .drain(..)
                .partition(|(owner, _)| *owner == token);
            *observers = kept;
            removed.into_iter().map(|(_, fd)| fd).collect()
        };
        for fd in &removed {
            if let Err(err) = self.ctl(libc::EPOLL_CTL_DEL, fd.as_raw_fd(), 0, 0) {
                trace!(error = %err, "observer already gone");
            }
        }
        self.ctl(libc::EPOLL_CTL_DEL, event.fd.as_raw_fd(), 0, 0)
    }

    fn observe(&self, event: &EpollEvent, signals: &SignalSet) -> SignalFdResult<()> {
        if signals.is_empty() {
            return Ok(());
        }
        // SAFETY: valid set pointer for the duration of the call.
        let fd = owned(unsafe {
            libc::signalfd(-1, signals.as_raw(), libc::SFD_NONBLOCK | libc::SFD_CLOEXEC)
        })?;
        let token = self.token(event);
        self.ctl(
            libc::EPOLL_CTL_ADD,
            fd.as_raw_fd(),
            (libc::EPOLLIN | libc::EPOLLET) as u32,
            token,
        )?;
        self.observers.lock().push((token, fd));
        Ok(())
    }

    fn token(&self, event: &EpollEvent) -> u64 {
        event.fd.as_raw_fd() as u64
    }

    fn wait(&self, timeout: Option<Duration>) -> SignalFdResult<Vec<u64>> {
        let timeout_ms = match timeout {
            None => -1,
            Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        };
        let mut events = [libc::epoll_event { events: 0, u64: 0 }; WAIT_BATCH];
        // SAFETY: the buffer holds WAIT_BATCH entries.
        let n = unsafe {
            libc::epoll_wait(
                self.fd.as_raw_fd(),
                events.as_mut_ptr(),
                WAIT_BATCH as libc::c_int,
                timeout_ms,
            )
        };
        if n < 0 {
            return match Errno::last() {
                Errno::EINTR => Ok(Vec::new()),
                errno => Err(errno.into()),
            };
        }

        let mut tokens: Vec<u64> = events[..n as usize].iter().map(|event| event.u64).collect();
        tokens.sort_unstable();
        tokens.dedup();
        Ok(tokens)
    }
}
