use std::time::SystemTime;

use bytes::BytesMut;

use crate::config::Config;
use crate::error::Result;
use crate::manager::{EventResult, MpxCtx};
use crate::receive_policy::ReceivePolicy;
use crate::socket::Socket;

/// Protocol layer sitting on top of a [`Transport`](crate::Transport).
///
/// The transport moves bytes; the application encodes and decodes them and
/// reacts to timeouts. Callbacks receive an [`AppCtx`] for enqueueing
/// output, steering the receive policy, and scheduling timeouts.
pub trait Application: Send {
    /// One-shot hook, invoked when the owning transport is initialized.
    fn init(&mut self, ctx: &mut AppCtx<'_, '_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Whether the application has more data to send. The transport keeps
    /// write interest alive while this holds.
    fn has_more_data(&self) -> bool;

    /// Fills the transport's write buffer (via [`AppCtx::enqueue`]).
    fn produce(&mut self, ctx: &mut AppCtx<'_, '_>) -> Result<EventResult>;

    /// Consumes received bytes. The transport delivers the whole buffered
    /// region once it holds at least `min_size` bytes of the current
    /// receive policy.
    fn consume(&mut self, ctx: &mut AppCtx<'_, '_>, bytes: &[u8]) -> Result<EventResult>;

    /// A timeout scheduled through [`AppCtx::set_timeout`] fired.
    fn handle_timeout(&mut self, ctx: &mut AppCtx<'_, '_>, id: u64) -> Result<EventResult> {
        let _ = (ctx, id);
        Ok(EventResult::Continue)
    }
}

/// Transport surface handed to application callbacks.
pub struct AppCtx<'a, 'b> {
    pub(crate) wbuf: &'a mut BytesMut,
    pub(crate) policy: &'a mut ReceivePolicy,
    pub(crate) mpx: &'a mut MpxCtx<'b>,
}

impl<'a, 'b> AppCtx<'a, 'b> {
    /// Appends bytes to the transport's write buffer. The transport takes
    /// care of write interest and flushing.
    pub fn enqueue(&mut self, bytes: &[u8]) {
        self.wbuf.extend_from_slice(bytes);
    }

    /// Replaces the receive policy applied from the next read on.
    /// [`ReceivePolicy::stop`] makes the transport clear its read interest.
    pub fn configure_next_read(&mut self, policy: ReceivePolicy) {
        *self.policy = policy;
    }

    /// Schedules a timeout for the owning transport; the id comes back via
    /// [`Application::handle_timeout`].
    pub fn set_timeout(&mut self, when: SystemTime) -> u64 {
        self.mpx.set_timeout(when)
    }

    pub fn cancel_timeout(&mut self, id: u64) {
        self.mpx.cancel_timeout(id);
    }

    pub fn socket(&self) -> Socket {
        self.mpx.socket()
    }

    pub fn config(&self) -> &Config {
        self.mpx.config()
    }
}
