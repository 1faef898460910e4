/*!
 * Kqueue Event Queue
 *
 * Readiness events are `EVFILT_USER` entries with process-unique idents.
 * Signal observers are `EVFILT_SIGNAL` entries. The kernel keys those by
 * signal number alone, so contexts sharing a queue and a signal share one
 * observer; its wakeups are fanned out to every owning context and it is
 * deleted with its last owner.
 */

use super::observers::ObserverOwners;
use crate::core::errors::{SignalFdError, SignalFdResult};
use crate::signals::{EventQueue, SignalSet};
use nix::errno::Errno;
use parking_lot::Mutex;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::warn;

const WAIT_BATCH: usize = 32;

static NEXT_IDENT: AtomicUsize = AtomicUsize::new(1);

/// Readiness event registered on a [`Kqueue`]
#[derive(Debug)]
pub struct KqueueEvent {
    ident: usize,
}

/// Kqueue-backed event queue
#[derive(Debug)]
pub struct Kqueue {
    fd: OwnedFd,
    observers: Mutex<ObserverOwners>,
}

fn change(ident: usize, filter: i16, flags: u16, fflags: u32, token: usize) -> libc::kevent {
    // SAFETY: kevent is plain data; zero is valid for every field.
    let mut kev: libc::kevent = unsafe { std::mem::zeroed() };
    kev.ident = ident;
    kev.filter = filter;
    kev.flags = flags;
    kev.fflags = fflags;
    kev.udata = token as *mut libc::c_void;
    kev
}

impl Kqueue {
    pub fn open() -> SignalFdResult<Self> {
        // SAFETY: plain syscall.
        let raw = unsafe { libc::kqueue() };
        if raw < 0 {
            return Err(SignalFdError::last_os_error());
        }
        // SAFETY: fresh descriptor owned by nobody else.
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(raw) },
            observers: Mutex::new(ObserverOwners::new()),
        })
    }

    /// Submit a change list in one call
    fn apply(&self, changes: &[libc::kevent]) -> SignalFdResult<()> {
        // SAFETY: `changes` is a valid slice; no event list is requested.
        let rc = unsafe {
            libc::kevent(
                self.fd.as_raw_fd(),
                changes.as_ptr(),
                changes.len() as libc::c_int,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };
        if rc < 0 {
            return Err(SignalFdError::last_os_error());
        }
        Ok(())
    }
}

impl EventQueue for Kqueue {
    type Event = KqueueEvent;

    fn register(&self) -> SignalFdResult<KqueueEvent> {
        let ident = NEXT_IDENT.fetch_add(1, Ordering::Relaxed);
        self.apply(&[change(
            ident,
            libc::EVFILT_USER,
            libc::EV_ADD | libc::EV_CLEAR,
            0,
            ident,
        )])?;
        Ok(KqueueEvent { ident })
    }

    fn trigger(&self, event: &KqueueEvent) -> SignalFdResult<()> {
        self.apply(&[change(
            event.ident,
            libc::EVFILT_USER,
            0,
            libc::NOTE_TRIGGER,
            event.ident,
        )])
    }

    fn clear(&self, event: &KqueueEvent) {
        // A triggered user event stays pending until retrieved; re-adding
        // it resets the trigger state.
        let _ = self.apply(&[
            change(event.ident, libc::EVFILT_USER, libc::EV_DELETE, 0, event.ident),
            change(
                event.ident,
                libc::EVFILT_USER,
                libc::EV_ADD | libc::EV_CLEAR,
                0,
                event.ident,
            ),
        ]);
    }

    fn deregister(&self, event: &KqueueEvent) -> SignalFdResult<()> {
        let mut observers = self.observers.lock();
        let orphaned = observers.release(event.ident as u64);

        // Signal deletes first: a failing entry stops the rest of the list,
        // and the user event delete is the one whose error matters.
        let mut changes: Vec<libc::kevent> = orphaned
            .iter()
            .map(|signo| change(*signo as usize, libc::EVFILT_SIGNAL, libc::EV_DELETE, 0, 0))
            .collect();
        changes.push(change(
            event.ident,
            libc::EVFILT_USER,
            libc::EV_DELETE,
            0,
            event.ident,
        ));
        self.apply(&changes)
    }

    fn observe(&self, event: &KqueueEvent, signals: &SignalSet) -> SignalFdResult<()> {
        let token = event.ident as u64;
        let mut observers = self.observers.lock();
        let fresh = observers.claim(token, signals.iter().map(|signal| signal.raw()));

        let changes: Vec<libc::kevent> = fresh
            .iter()
            .map(|signo| change(*signo as usize, libc::EVFILT_SIGNAL, libc::EV_ADD, 0, 0))
            .collect();
        if changes.is_empty() {
            return Ok(());
        }
        if let Err(err) = self.apply(&changes) {
            // Entries before the failing one may have been added
            for signo in observers.release(token) {
                let delete = change(signo as usize, libc::EVFILT_SIGNAL, libc::EV_DELETE, 0, 0);
                if let Err(cleanup) = self.apply(&[delete]) {
                    warn!(signo, error = %cleanup, "failed to drop partial signal observer");
                }
            }
            return Err(err);
        }
        Ok(())
    }

    fn token(&self, event: &KqueueEvent) -> u64 {
        event.ident as u64
    }

    fn wait(&self, timeout: Option<Duration>) -> SignalFdResult<Vec<u64>> {
        // SAFETY: zero is valid for timespec.
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        let ts_ptr = match timeout {
            None => ptr::null(),
            Some(t) => {
                ts.tv_sec = t.as_secs() as libc::time_t;
                ts.tv_nsec = t.subsec_nanos() as libc::c_long;
                &ts as *const libc::timespec
            }
        };
        // SAFETY: kevent is plain data; zero is valid for every field.
        let mut events: [libc::kevent; WAIT_BATCH] = unsafe { std::mem::zeroed() };

        // SAFETY: the buffer holds WAIT_BATCH entries and `ts` outlives the call.
        let n = unsafe {
            libc::kevent(
                self.fd.as_raw_fd(),
                ptr::null(),
                0,
                events.as_mut_ptr(),
                WAIT_BATCH as libc::c_int,
                ts_ptr,
            )
        };
        if n < 0 {
            return match Errno::last() {
                Errno::EINTR => Ok(Vec::new()),
                errno => Err(errno.into()),
            };
        }

        let observers = self.observers.lock();
        let mut tokens = Vec::with_capacity(n as usize);
        for kev in &events[..n as usize] {
            if kev.filter == libc::EVFILT_SIGNAL {
                tokens.extend_from_slice(observers.owners(kev.ident as i32));
            } else {
                tokens.push(kev.udata as usize as u64);
            }
        }
        drop(observers);
        tokens.sort_unstable();
        tokens.dedup();
        Ok(tokens)
    }
}
