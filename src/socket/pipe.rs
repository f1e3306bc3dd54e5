use std::io;

use crate::socket::{AsSocket, Socket, checked_len};

/// One end of the multiplexer's wakeup pipe.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PipeSocket(pub Socket);

impl PipeSocket {
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

    /// Writes `buf` in a single syscall. Writes of at most PIPE_BUF bytes
    /// are atomic at the kernel level, which the control-frame protocol
    /// relies on.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let ret = unsafe {
            libc::write(self.0.id, buf.as_ptr() as *const libc::c_void, buf.len())
        };
        checked_len(ret)
    }
}

impl AsSocket for PipeSocket {
    fn as_socket(&self) -> Socket {
        self.0
    }
}

/// Creates a `(reader, writer)` pipe pair.
pub fn pipe_socket_pair() -> io::Result<(PipeSocket, PipeSocket)> {
    let mut fds = [0 as libc::c_int; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((
        PipeSocket(Socket::new(fds[0])),
        PipeSocket(Socket::new(fds[1])),
    ))
}
