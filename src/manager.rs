use std::collections::BTreeSet;
use std::time::SystemTime;

use tracing::trace;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::operation::Operation;
use crate::poll::Poller;
use crate::socket::Socket;
use crate::timeout::TimeoutEntry;

/// What a manager wants after handling an event.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EventResult {
    /// Keep the current interest bit; deliver the event again when ready.
    Continue,
    /// Clear the interest bit for the handled operation; the manager is
    /// removed once its mask is empty.
    Done,
}

/// Per-connection state machine driven by the multiplexer.
///
/// All callbacks run on the loop thread and receive a [`MpxCtx`] through
/// which the manager mutates its own registration, schedules timeouts, or
/// hands new managers to the loop.
pub trait SocketManager: Send {
    /// The socket this manager owns. Must stay stable for the manager's
    /// lifetime; it is the key under which the multiplexer tracks it.
    fn socket(&self) -> Socket;

    /// One-shot hook, invoked right after the manager is added.
    fn init(&mut self, ctx: &mut MpxCtx<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// The owned socket is ready for a non-blocking read.
    fn handle_read_event(&mut self, ctx: &mut MpxCtx<'_>) -> Result<EventResult>;

    /// The owned socket is ready for a non-blocking write.
    fn handle_write_event(&mut self, ctx: &mut MpxCtx<'_>) -> Result<EventResult> {
        let _ = ctx;
        Ok(EventResult::Done)
    }

    /// A timeout scheduled for this manager fired. Called exactly once per
    /// id.
    fn handle_timeout(&mut self, ctx: &mut MpxCtx<'_>, id: u64) -> Result<EventResult> {
        let _ = (ctx, id);
        Ok(EventResult::Continue)
    }

    /// Terminal error; the multiplexer removes the manager afterwards.
    fn handle_error(&mut self, err: &Error) {
        let _ = err;
    }
}

/// Builds a manager for a socket handed to the loop via an `add` control
/// frame. `key` selects among the manager kinds the factory knows; `args`
/// is the opaque blob carried in the frame.
pub trait SocketManagerFactory: Send {
    fn make(
        &mut self,
        sock: Socket,
        key: u16,
        args: &[u8],
        cfg: &Config,
    ) -> Result<Box<dyn SocketManager>>;
}

/// Multiplexer surface exposed to a manager during a callback.
///
/// Interest changes apply to the kernel registration immediately; newly
/// added managers are queued and registered right after the callback
/// returns.
pub struct MpxCtx<'a> {
    pub(crate) poller: &'a mut Poller,
    pub(crate) timeouts: &'a mut BTreeSet<TimeoutEntry>,
    pub(crate) current_timeout: &'a mut Option<SystemTime>,
    pub(crate) next_timeout_id: &'a mut u64,
    pub(crate) pending: &'a mut Vec<(Box<dyn SocketManager>, Operation)>,
    pub(crate) shutting_down: &'a mut bool,
    pub(crate) cfg: &'a Config,
    pub(crate) sock: Socket,
    pub(crate) interest: &'a mut Operation,
    pub(crate) removed: &'a mut bool,
}

impl<'a> MpxCtx<'a> {
    /// The socket of the manager currently being called back.
    pub fn socket(&self) -> Socket {
        self.sock
    }

    pub fn config(&self) -> &Config {
        self.cfg
    }

    /// The interest mask currently registered with the kernel.
    pub fn interest(&self) -> Operation {
        *self.interest
    }

    /// Unions `op` into the interest mask, updating the kernel registration
    /// only if the mask changed.
    pub fn enable(&mut self, op: Operation) -> Result<()> {
        let mask = *self.interest | op;
        if mask != *self.interest {
            self.poller.modify(self.sock, mask)?;
            *self.interest = mask;
            trace!(sock = self.sock.id, %mask, "interest enabled");
        }
        Ok(())
    }

    /// Subtracts `op` from the interest mask. When the mask empties and
    /// `remove` is set, the manager is dropped at the next safe point
    /// (right after this callback returns).
    pub fn disable(&mut self, op: Operation, remove: bool) -> Result<()> {
        let mask = *self.interest - op;
        if mask != *self.interest {
            self.poller.modify(self.sock, mask)?;
            *self.interest = mask;
            trace!(sock = self.sock.id, %mask, "interest disabled");
        }
        if mask.is_empty() && remove {
            *self.removed = true;
        }
        Ok(())
    }

    /// Schedules a timeout for this manager at `when` and returns its id.
    /// Ids are monotonic over the life of the multiplexer.
    pub fn set_timeout(&mut self, when: SystemTime) -> u64 {
        let id = *self.next_timeout_id;
        *self.next_timeout_id += 1;
        self.timeouts.insert(TimeoutEntry::new(when, id, self.sock));
        if self.current_timeout.is_none_or(|cur| when < cur) {
            *self.current_timeout = Some(when);
        }
        trace!(sock = self.sock.id, id, "timeout scheduled");
        id
    }

    /// Cancels a scheduled timeout. A no-op for ids that already fired.
    pub fn cancel_timeout(&mut self, id: u64) {
        if let Some(entry) = self.timeouts.iter().find(|e| e.id == id).copied() {
            self.timeouts.remove(&entry);
            *self.current_timeout = self.timeouts.first().map(|e| e.when);
        }
    }

    /// Queues a new manager; it is added with `initial` interest right
    /// after the current callback returns.
    pub fn add(&mut self, mgr: Box<dyn SocketManager>, initial: Operation) {
        self.pending.push((mgr, initial));
    }

    /// Asks the loop to stop after the current iteration.
    pub fn shutdown(&mut self) {
        *self.shutting_down = true;
    }
}
