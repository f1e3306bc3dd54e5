//! Socket handles and the operations shared by every socket flavor.
//!
//! A [`Socket`] is a copyable, non-owning handle to a kernel file
//! descriptor. Ownership of the underlying resource is conveyed by
//! [`SocketGuard`], which closes on drop unless released.

pub mod guard;
pub mod pipe;
pub mod stream;
pub mod tcp;

pub use guard::{SocketGuard, make_socket_guard};
pub use pipe::{PipeSocket, pipe_socket_pair};
pub use stream::{StreamSocket, stream_socket_pair};
pub use tcp::{
    TcpAcceptSocket, TcpStreamSocket, make_connected_tcp_stream_socket, make_tcp_accept_socket,
};

use std::io;
use std::os::fd::RawFd;

/// Opaque handle to a kernel file descriptor.
///
/// Equality is by identifier. Copying the handle does not duplicate the
/// descriptor; closing happens through [`close`] or a [`SocketGuard`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Socket {
    pub id: RawFd,
}

impl Socket {
    pub const INVALID: Socket = Socket { id: -1 };

    pub const fn new(id: RawFd) -> Socket {
        Socket { id }
    }

    pub const fn is_valid(self) -> bool {
        self.id >= 0
    }
}

/// Any typed socket wrapper that can yield its underlying handle.
pub trait AsSocket {
    fn as_socket(&self) -> Socket;
}

impl AsSocket for Socket {
    fn as_socket(&self) -> Socket {
        *self
    }
}

/// Closes `sock`. A no-op on the invalid sentinel.
pub fn close(sock: Socket) {
    if sock.is_valid() {
        unsafe {
            libc::close(sock.id);
        }
    }
}

/// Shuts down both directions of `sock`. A no-op on the invalid sentinel.
pub fn shutdown(sock: Socket) {
    if sock.is_valid() {
        unsafe {
            libc::shutdown(sock.id, libc::SHUT_RDWR);
        }
    }
}

/// Enables or disables O_NONBLOCK on `sock`.
pub fn nonblocking(sock: Socket, new_value: bool) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(sock.id, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let flags = if new_value {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };
    let ret = unsafe { libc::fcntl(sock.id, libc::F_SETFL, flags) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Whether an error kind means "not ready, try again" on a non-blocking
/// socket.
pub fn is_temporary(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Converts the result of a libc read/write style call into an
/// `io::Result`, capturing errno on failure.
pub(crate) fn checked_len(ret: isize) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_sentinel() {
        assert!(!Socket::INVALID.is_valid());
        assert!(Socket::new(0).is_valid());
        assert_eq!(Socket::new(3), Socket::new(3));
        assert_ne!(Socket::new(3), Socket::new(4));
    }

    #[test]
    fn close_invalid_is_noop() {
        close(Socket::INVALID);
        shutdown(Socket::INVALID);
    }
}
