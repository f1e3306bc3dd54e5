use std::io;

use bytes::{Buf, BytesMut};
use tracing::debug;

use crate::application::{AppCtx, Application};
use crate::error::{Error, Result};
use crate::manager::{EventResult, MpxCtx, SocketManager};
use crate::operation::Operation;
use crate::receive_policy::ReceivePolicy;
use crate::socket::{self, Socket, SocketGuard, StreamSocket, make_socket_guard};

/// Receive policy a transport starts out with.
const DEFAULT_POLICY: ReceivePolicy = ReceivePolicy::up_to(8 * 1024);

/// Canonical socket manager: drives a stream socket's read/write buffers
/// and feeds an [`Application`].
///
/// Read path: reserve `max_size` free bytes, read, and once at least
/// `min_size` bytes are buffered hand the filled region to the
/// application. Write path: refill from `produce` when the buffer runs
/// dry, flush, and drop write interest once drained with nothing pending.
pub struct Transport<A: Application> {
    sock: SocketGuard<StreamSocket>,
    rbuf: BytesMut,
    wbuf: BytesMut,
    policy: ReceivePolicy,
    app: A,
}

impl<A: Application> Transport<A> {
    pub fn new(sock: impl Into<StreamSocket>, app: A) -> Transport<A> {
        Transport {
            sock: make_socket_guard(sock.into()),
            rbuf: BytesMut::new(),
            wbuf: BytesMut::new(),
            policy: DEFAULT_POLICY,
            app,
        }
    }

    pub fn application(&self) -> &A {
        &self.app
    }

    /// Enables write interest when output is pending or the application
    /// promises more.
    fn update_write_interest(&mut self, ctx: &mut MpxCtx<'_>) -> Result<()> {
        if !self.wbuf.is_empty() || self.app.has_more_data() {
            ctx.enable(Operation::WRITE)?;
        }
        Ok(())
    }
}

impl<A: Application> SocketManager for Transport<A> {
    fn socket(&self) -> Socket {
        self.sock.socket()
    }

    fn init(&mut self, ctx: &mut MpxCtx<'_>) -> Result<()> {
        let mut app_ctx = AppCtx {
            wbuf: &mut self.wbuf,
            policy: &mut self.policy,
            mpx: ctx,
        };
        self.app.init(&mut app_ctx)?;
        self.update_write_interest(ctx)
    }

    fn handle_read_event(&mut self, ctx: &mut MpxCtx<'_>) -> Result<EventResult> {
        if self.policy.is_stop() {
            return Ok(EventResult::Done);
        }

        // Make room for a full read under the current policy, then trim the
        // buffer back to what actually arrived.
        let fill = self.rbuf.len();
        let max = self.policy.max_size as usize;
        self.rbuf.resize(fill + max, 0);
        let n = match self.sock.read(&mut self.rbuf[fill..fill + max]) {
            Ok(0) => {
                self.rbuf.truncate(fill);
                return Err(Error::Socket(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed the connection",
                )));
            }
            Ok(n) => n,
            Err(e) if socket::is_temporary(&e) => {
                self.rbuf.truncate(fill);
                return Ok(EventResult::Continue);
            }
            Err(e) => {
                self.rbuf.truncate(fill);
                return Err(Error::Socket(e));
            }
        };
        self.rbuf.truncate(fill + n);

        // Deliver while enough is buffered; `consume` may retarget the
        // policy mid-loop, including to `stop`.
        while !self.policy.is_stop() && self.rbuf.len() >= self.policy.min_size as usize {
            let chunk = self.rbuf.split().freeze();
            let mut app_ctx = AppCtx {
                wbuf: &mut self.wbuf,
                policy: &mut self.policy,
                mpx: ctx,
            };
            let res = self.app.consume(&mut app_ctx, &chunk)?;
            self.update_write_interest(ctx)?;
            if res == EventResult::Done {
                return Ok(EventResult::Done);
            }
        }

        if self.policy.is_stop() {
            return Ok(EventResult::Done);
        }
        Ok(EventResult::Continue)
    }

    fn handle_write_event(&mut self, ctx: &mut MpxCtx<'_>) -> Result<EventResult> {
        if self.wbuf.is_empty() && self.app.has_more_data() {
            let mut app_ctx = AppCtx {
                wbuf: &mut self.wbuf,
                policy: &mut self.policy,
                mpx: ctx,
            };
            self.app.produce(&mut app_ctx)?;
        }

        while !self.wbuf.is_empty() {
            match self.sock.write(&self.wbuf) {
                Ok(0) => {
                    return Err(Error::Socket(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "kernel accepted no bytes",
                    )));
                }
                Ok(n) => self.wbuf.advance(n),
                Err(e) if socket::is_temporary(&e) => return Ok(EventResult::Continue),
                Err(e) => return Err(Error::Socket(e)),
            }
        }

        if self.app.has_more_data() {
            Ok(EventResult::Continue)
        } else {
            Ok(EventResult::Done)
        }
    }

    fn handle_timeout(&mut self, ctx: &mut MpxCtx<'_>, id: u64) -> Result<EventResult> {
        let mut app_ctx = AppCtx {
            wbuf: &mut self.wbuf,
            policy: &mut self.policy,
            mpx: ctx,
        };
        let res = self.app.handle_timeout(&mut app_ctx, id)?;
        self.update_write_interest(ctx)?;
        Ok(res)
    }

    fn handle_error(&mut self, err: &Error) {
        debug!(sock = self.sock.socket().id, %err, "transport failed");
    }
}
