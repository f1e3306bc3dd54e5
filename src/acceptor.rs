use tracing::debug;

use crate::endpoint::V4Endpoint;
use crate::error::{Error, Result};
use crate::manager::{EventResult, MpxCtx, SocketManager};
use crate::operation::Operation;
use crate::socket::{
    self, Socket, SocketGuard, TcpAcceptSocket, TcpStreamSocket, make_socket_guard,
    make_tcp_accept_socket,
};

/// Socket manager for a TCP accept socket.
///
/// On read readiness it accepts until the backlog is drained, applies the
/// configured socket options, and hands each connection's manager (built by
/// the closure) to the multiplexer with read interest.
pub struct Acceptor<F>
where
    F: FnMut(TcpStreamSocket) -> Box<dyn SocketManager> + Send,
{
    sock: SocketGuard<TcpAcceptSocket>,
    make: F,
}

impl<F> Acceptor<F>
where
    F: FnMut(TcpStreamSocket) -> Box<dyn SocketManager> + Send,
{
    pub fn new(sock: TcpAcceptSocket, make: F) -> Acceptor<F> {
        Acceptor {
            sock: make_socket_guard(sock),
            make,
        }
    }

    /// Binds to `ep` (port 0 picks a free port) and returns the acceptor
    /// together with the bound port.
    pub fn bind(ep: V4Endpoint, backlog: i32, make: F) -> Result<(Acceptor<F>, u16)> {
        let (sock, port) = make_tcp_accept_socket(ep, backlog)?;
        debug!(%ep, port, "acceptor bound");
        Ok((Acceptor::new(sock, make), port))
    }
}

impl<F> SocketManager for Acceptor<F>
where
    F: FnMut(TcpStreamSocket) -> Box<dyn SocketManager> + Send,
{
    fn socket(&self) -> Socket {
        self.sock.socket()
    }

    fn handle_read_event(&mut self, ctx: &mut MpxCtx<'_>) -> Result<EventResult> {
        loop {
            match self.sock.accept() {
                Ok(stream) => {
                    let guard = make_socket_guard(stream);
                    if ctx.config().tcp_nodelay {
                        guard.nodelay(true)?;
                    }
                    if ctx.config().keepalive {
                        guard.as_stream().keepalive(true)?;
                    }
                    debug!(sock = guard.socket().id, "connection accepted");
                    ctx.add((self.make)(guard.release()), Operation::READ);
                }
                Err(e) if socket::is_temporary(&e) => return Ok(EventResult::Continue),
                Err(e) => return Err(Error::Socket(e)),
            }
        }
    }
}
