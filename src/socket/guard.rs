use crate::socket::{AsSocket, Socket, close};

/// Scoped ownership of a socket: closes the descriptor when dropped unless
/// [`SocketGuard::release`] was called first.
#[derive(Debug)]
pub struct SocketGuard<S: AsSocket> {
    sock: Option<S>,
}

impl<S: AsSocket> SocketGuard<S> {
    pub fn new(sock: S) -> SocketGuard<S> {
        SocketGuard { sock: Some(sock) }
    }

    /// Gives up ownership without closing; the caller is responsible for the
    /// descriptor from here on.
    pub fn release(mut self) -> S {
        self.sock.take().expect("guard already released")
    }

    pub fn socket(&self) -> Socket {
        match &self.sock {
            Some(s) => s.as_socket(),
            None => Socket::INVALID,
        }
    }
}

impl<S: AsSocket> std::ops::Deref for SocketGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.sock.as_ref().expect("guard already released")
    }
}

impl<S: AsSocket> Drop for SocketGuard<S> {
    fn drop(&mut self) {
        if let Some(sock) = self.sock.take() {
            close(sock.as_socket());
        }
    }
}

impl<S: AsSocket> AsSocket for SocketGuard<S> {
    fn as_socket(&self) -> Socket {
        self.socket()
    }
}

/// Wraps `sock` in a guard.
pub fn make_socket_guard<S: AsSocket>(sock: S) -> SocketGuard<S> {
    SocketGuard::new(sock)
}
