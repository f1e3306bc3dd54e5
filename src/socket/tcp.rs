use std::io;
use std::mem;

use crate::endpoint::{V4Endpoint, from_sockaddr_in, to_sockaddr_in};
use crate::socket::{AsSocket, Socket, StreamSocket};

/// Connected TCP stream socket.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TcpStreamSocket(pub Socket);

impl TcpStreamSocket {
    /// Views this socket as a plain stream socket for read/write.
    pub fn as_stream(&self) -> StreamSocket {
        StreamSocket(self.0)
    }

    /// Enables or disables TCP_NODELAY.
    pub fn nodelay(&self, new_value: bool) -> io::Result<()> {
        let optval: libc::c_int = if new_value { 1 } else { 0 };
        let ret = unsafe {
            libc::setsockopt(
                self.0.id,
                libc::IPPROTO_TCP,
                libc::TCP_NODELAY,
                &optval as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl AsSocket for TcpStreamSocket {
    fn as_socket(&self) -> Socket {
        self.0
    }
}

impl From<TcpStreamSocket> for StreamSocket {
    fn from(sock: TcpStreamSocket) -> StreamSocket {
        sock.as_stream()
    }
}

/// Listening TCP socket.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TcpAcceptSocket(pub Socket);

impl TcpAcceptSocket {
    /// Accepts one pending connection. `WouldBlock` means none are queued.
    pub fn accept(&self) -> io::Result<TcpStreamSocket> {
        let fd = unsafe { libc::accept(self.0.id, std::ptr::null_mut(), std::ptr::null_mut()) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(TcpStreamSocket(Socket::new(fd)))
    }
}

impl AsSocket for TcpAcceptSocket {
    fn as_socket(&self) -> Socket {
        self.0
    }
}

/// Creates a TCP accept socket bound to `ep` and returns it together with
/// the bound port (useful with port 0).
pub fn make_tcp_accept_socket(
    ep: V4Endpoint,
    backlog: i32,
) -> io::Result<(TcpAcceptSocket, u16)> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let sock = Socket::new(fd);

    let optval: libc::c_int = 1;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &optval as *const _ as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }

    let saddr = to_sockaddr_in(ep);
    let ret = unsafe {
        libc::bind(
            fd,
            &saddr as *const _ as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        super::close(sock);
        return Err(err);
    }

    let ret = unsafe { libc::listen(fd, backlog) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        super::close(sock);
        return Err(err);
    }

    // Read back the bound endpoint; the caller may have asked for port 0.
    let mut bound: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockname(fd, &mut bound as *mut _ as *mut libc::sockaddr, &mut len)
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        super::close(sock);
        return Err(err);
    }

    Ok((TcpAcceptSocket(sock), from_sockaddr_in(&bound).port))
}

/// Dials a TCP connection to `ep`. The connect itself is blocking; the
/// multiplexer switches the socket to non-blocking when it is registered.
pub fn make_connected_tcp_stream_socket(ep: V4Endpoint) -> io::Result<TcpStreamSocket> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let sock = Socket::new(fd);

    let saddr = to_sockaddr_in(ep);
    let ret = unsafe {
        libc::connect(
            fd,
            &saddr as *const _ as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        super::close(sock);
        return Err(err);
    }

    Ok(TcpStreamSocket(sock))
}
