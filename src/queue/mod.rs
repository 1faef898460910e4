/*!
 * Event Queue Backends
 * Readiness-event hosts for signal contexts, selected at compile time
 */

mod soft;

#[cfg(any(
    test,
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
mod observers;

pub use soft::{SoftEvent, SoftQueue};

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use epoll::{Epoll, EpollEvent};

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
mod kqueue;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
pub use kqueue::{Kqueue, KqueueEvent};

/// Native queue for this target
#[cfg(any(target_os = "linux", target_os = "android"))]
pub type PlatformQueue = Epoll;

/// Native queue for this target
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly"
))]
pub type PlatformQueue = Kqueue;

/// No native queue with signal observers here; fall back to software
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly"
)))]
pub type PlatformQueue = SoftQueue;
