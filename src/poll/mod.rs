//! Kernel event notification behind a small capability set.
//!
//! Both backends expose the same surface: create, register/modify/
//! deregister a socket for an [`Operation`] mask, and wait for readiness
//! into a caller-provided buffer. Semantics are normalized to
//! level-triggered on both: epoll without `EPOLLET`, kqueue without
//! `EV_CLEAR`. An interrupted wait (`EINTR`) reports zero events instead
//! of an error.

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
))]
mod kqueue;

#[cfg(target_os = "linux")]
pub use epoll::Poller;
#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
))]
pub use kqueue::Poller;

use crate::socket::Socket;

/// Upper bound on readiness records returned by a single wait.
pub const MAX_EVENTS: usize = 32;

/// One readiness record, normalized across backends.
#[derive(Clone, Copy, Debug)]
pub struct PollEvent {
    pub sock: Socket,
    pub readable: bool,
    pub writable: bool,
    /// Error or hangup reported by the kernel.
    pub erroneous: bool,
}
