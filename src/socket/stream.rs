use std::io;
use std::mem;

use crate::socket::{AsSocket, Socket, checked_len, nonblocking};

/// Stream-oriented socket.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StreamSocket(pub Socket);

impl StreamSocket {
    /// Receives up to `buf.len()` bytes. `Ok(0)` means the peer closed the
    /// connection; `WouldBlock` means no data is ready.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let ret = unsafe {
            libc::read(
                self.0.id,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        checked_len(ret)
    }

    /// Sends up to `buf.len()` bytes, returning the number accepted by the
    /// kernel. `WouldBlock` means the send buffer is full. A peer hangup
    /// surfaces as `BrokenPipe` rather than SIGPIPE.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        #[cfg(target_os = "linux")]
        const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
        #[cfg(not(target_os = "linux"))]
        const SEND_FLAGS: libc::c_int = 0;

        let ret = unsafe {
            libc::send(
                self.0.id,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                SEND_FLAGS,
            )
        };
        checked_len(ret)
    }

    /// Enables or disables SO_KEEPALIVE.
    pub fn keepalive(&self, new_value: bool) -> io::Result<()> {
        let optval: libc::c_int = if new_value { 1 } else { 0 };
        let ret = unsafe {
            libc::setsockopt(
                self.0.id,
                libc::SOL_SOCKET,
                libc::SO_KEEPALIVE,
                &optval as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn nonblocking(&self, new_value: bool) -> io::Result<()> {
        nonblocking(self.0, new_value)
    }
}

impl AsSocket for StreamSocket {
    fn as_socket(&self) -> Socket {
        self.0
    }
}

/// Creates a connected pair of stream sockets (unix domain).
pub fn stream_socket_pair() -> io::Result<(StreamSocket, StreamSocket)> {
    let mut fds = [0 as libc::c_int; 2];
    let ret = unsafe {
        libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr())
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((
        StreamSocket(Socket::new(fds[0])),
        StreamSocket(Socket::new(fds[1])),
    ))
}
