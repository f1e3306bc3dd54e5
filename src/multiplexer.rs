use std::collections::{BTreeSet, HashMap};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use tracing::{debug, error, trace, warn};

use crate::config::Config;
use crate::endpoint::V4Endpoint;
use crate::error::{Error, Result};
use crate::frame::{ControlFrame, MAX_BODY_LEN};
use crate::manager::{EventResult, MpxCtx, SocketManager, SocketManagerFactory};
use crate::operation::Operation;
use crate::poll::{MAX_EVENTS, PollEvent, Poller};
use crate::socket::{
    self, AsSocket, PipeSocket, Socket, TcpStreamSocket, make_connected_tcp_stream_socket,
    make_socket_guard, pipe_socket_pair,
};
use crate::timeout::TimeoutEntry;

/// Registry slot: the manager plus the interest mask registered with the
/// kernel for its socket. Keeping the mask here makes "registered mask ==
/// interest mask" hold by construction.
struct ManagerSlot {
    mgr: Box<dyn SocketManager>,
    interest: Operation,
}

enum Dispatch {
    Init,
    Read,
    Write,
    Timeout(u64),
    Error(Error),
}

/// Single-threaded readiness multiplexer.
///
/// Owns the kernel event object, the socket-to-manager registry, and the
/// ordered timeout set. Exactly one thread, the loop thread, may call the
/// mutating entry points (`add`, `enable`, `disable`, `set_timeout`,
/// `poll_once`); other threads mutate the tables only by posting control
/// frames through a [`ControlSender`].
pub struct Multiplexer {
    poller: Poller,
    pollset: Vec<PollEvent>,
    managers: HashMap<Socket, ManagerSlot>,
    timeouts: BTreeSet<TimeoutEntry>,
    current_timeout: Option<SystemTime>,
    next_timeout_id: u64,
    pending: Vec<(Box<dyn SocketManager>, Operation)>,
    pipe_reader: PipeSocket,
    pipe_writer: PipeSocket,
    writer_detached: bool,
    factory: Box<dyn SocketManagerFactory>,
    cfg: Config,
    shutting_down: bool,
}

impl Multiplexer {
    /// Allocates the kernel event object, creates the wakeup pipe, and
    /// registers its reader. The multiplexer is usable for same-thread
    /// `poll_once` driving right away, or can be moved to a loop thread
    /// with [`Multiplexer::start`].
    pub fn new(factory: Box<dyn SocketManagerFactory>, cfg: Config) -> Result<Multiplexer> {
        let mut poller = Poller::new()?;
        let (pipe_reader, pipe_writer) = pipe_socket_pair()?;
        // The reader must never block the loop; the writer stays blocking
        // so external enqueues stall (backpressure) instead of failing when
        // the loop falls behind.
        socket::nonblocking(pipe_reader.as_socket(), true)?;
        poller.register(pipe_reader.as_socket(), Operation::READ)?;

        Ok(Multiplexer {
            poller,
            pollset: Vec::with_capacity(MAX_EVENTS),
            managers: HashMap::new(),
            timeouts: BTreeSet::new(),
            current_timeout: None,
            next_timeout_id: 0,
            pending: Vec::new(),
            pipe_reader,
            pipe_writer,
            writer_detached: false,
            factory,
            cfg,
            shutting_down: false,
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Number of registered socket managers (the wakeup pipe not counted).
    pub fn num_managers(&self) -> usize {
        self.managers.len()
    }

    pub fn contains(&self, sock: Socket) -> bool {
        self.managers.contains_key(&sock)
    }

    /// A sender for posting control frames from other threads. The sender
    /// stays valid until the multiplexer is destroyed (after `join`).
    pub fn sender(&self) -> ControlSender {
        ControlSender {
            writer: self.pipe_writer,
        }
    }

    // -- registry mutation (loop thread only) -------------------------------

    /// Registers `mgr` under its socket for `initial` interest and runs its
    /// `init` hook. The socket is switched to non-blocking here. Fails if
    /// the socket is already present.
    pub fn add(&mut self, mgr: Box<dyn SocketManager>, initial: Operation) -> Result<()> {
        let sock = mgr.socket();
        if !sock.is_valid() {
            return Err(Error::InvalidArgument(
                "cannot add a manager for the invalid socket".to_string(),
            ));
        }
        if self.managers.contains_key(&sock) {
            return Err(Error::InvalidArgument(format!(
                "socket {} is already registered",
                sock.id
            )));
        }
        socket::nonblocking(sock, true)?;
        self.poller.register(sock, initial)?;
        self.managers.insert(sock, ManagerSlot { mgr, interest: initial });
        debug!(sock = sock.id, interest = %initial, "manager added");
        self.dispatch(sock, Dispatch::Init);
        Ok(())
    }

    /// Unions `op` into the interest mask of the manager registered for
    /// `sock`, touching the kernel registration only if the mask changed.
    pub fn enable(&mut self, sock: Socket, op: Operation) -> Result<()> {
        let slot = self.managers.get_mut(&sock).ok_or_else(|| {
            Error::InvalidArgument(format!("socket {} is not registered", sock.id))
        })?;
        let mask = slot.interest | op;
        if mask != slot.interest {
            self.poller.modify(sock, mask)?;
            slot.interest = mask;
            trace!(sock = sock.id, %mask, "interest enabled");
        }
        Ok(())
    }

    /// Subtracts `op` from the interest mask; when the mask empties and
    /// `remove` is set, drops the manager.
    pub fn disable(&mut self, sock: Socket, op: Operation, remove: bool) -> Result<()> {
        let slot = self.managers.get_mut(&sock).ok_or_else(|| {
            Error::InvalidArgument(format!("socket {} is not registered", sock.id))
        })?;
        let mask = slot.interest - op;
        if mask != slot.interest {
            self.poller.modify(sock, mask)?;
            slot.interest = mask;
            trace!(sock = sock.id, %mask, "interest disabled");
        }
        if mask.is_empty() && remove {
            self.remove(sock);
        }
        Ok(())
    }

    /// Schedules a timeout for the manager registered for `sock`; returns
    /// the monotonic id.
    pub fn set_timeout(&mut self, sock: Socket, when: SystemTime) -> u64 {
        let id = self.next_timeout_id;
        self.next_timeout_id += 1;
        self.timeouts.insert(TimeoutEntry::new(when, id, sock));
        if self.current_timeout.is_none_or(|cur| when < cur) {
            self.current_timeout = Some(when);
        }
        trace!(sock = sock.id, id, "timeout scheduled");
        id
    }

    /// Cancels a scheduled timeout by id. A no-op for fired or unknown ids.
    pub fn cancel_timeout(&mut self, id: u64) {
        if let Some(entry) = self.timeouts.iter().find(|e| e.id == id).copied() {
            self.timeouts.remove(&entry);
            self.current_timeout = self.timeouts.first().map(|e| e.when);
        }
    }

    /// Dials a TCP stream to `ep`, builds a manager around the connected
    /// socket, and adds it for `initial` interest.
    pub fn tcp_connect<M, F>(&mut self, ep: V4Endpoint, initial: Operation, make: F) -> Result<()>
    where
        M: SocketManager + 'static,
        F: FnOnce(TcpStreamSocket) -> M,
    {
        let guard = make_socket_guard(make_connected_tcp_stream_socket(ep)?);
        if self.cfg.tcp_nodelay {
            guard.nodelay(true)?;
        }
        if self.cfg.keepalive {
            guard.as_stream().keepalive(true)?;
        }
        self.add(Box::new(make(guard.release())), initial)
    }

    /// Reports `err` and, for loop-fatal errors, stops the loop.
    pub fn handle_error(&mut self, err: &Error) {
        if err.is_fatal() {
            error!(%err, "fatal multiplexer error, shutting down");
            self.shutting_down = true;
        } else {
            warn!(%err, "multiplexer error");
        }
    }

    // -- the loop -----------------------------------------------------------

    /// One loop iteration: wait for readiness (bounded by the nearest
    /// timeout, or not at all when `blocking` is false), fire expired
    /// timeouts, then dispatch readiness events.
    pub fn poll_once(&mut self, blocking: bool) -> Result<()> {
        let timeout = if !blocking {
            Some(Duration::ZERO)
        } else {
            self.current_timeout.map(|when| {
                when.duration_since(SystemTime::now())
                    .unwrap_or(Duration::ZERO)
            })
        };

        let n = match self.poller.wait(&mut self.pollset, timeout) {
            Ok(n) => n,
            Err(e) => {
                // EINTR is absorbed by the poller; anything else is fatal.
                self.shutting_down = true;
                return Err(Error::Runtime(format!("kernel wait failed: {e}")));
            }
        };

        self.handle_timeouts();
        if n > 0 {
            self.handle_events(n);
        }
        Ok(())
    }

    /// Runs `poll_once` until shutdown is requested, then drains.
    pub fn run(&mut self) {
        debug!("multiplexer loop starting");
        while !self.shutting_down {
            if let Err(err) = self.poll_once(true) {
                self.handle_error(&err);
            }
        }
        self.drain();
    }

    /// Spawns the loop thread and hands back the external surface.
    pub fn start(mut self) -> Result<MultiplexerHandle> {
        let sender = self.sender();
        self.writer_detached = true;
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let thread = thread::Builder::new()
            .name("netmux-mpx".to_string())
            .spawn(move || {
                self.run();
                flag.store(false, Ordering::Release);
            })
            .map_err(|e| Error::Runtime(format!("failed to spawn loop thread: {e}")))?;
        Ok(MultiplexerHandle {
            running,
            sender,
            writer: Some(sender.writer),
            thread: Some(thread),
        })
    }

    fn handle_timeouts(&mut self) {
        let now = SystemTime::now();
        while let Some(first) = self.timeouts.first() {
            if first.when > now {
                break;
            }
            let entry = self.timeouts.pop_first().expect("set is non-empty");
            trace!(sock = entry.sock.id, id = entry.id, "timeout fired");
            self.dispatch(entry.sock, Dispatch::Timeout(entry.id));
        }
        self.current_timeout = self.timeouts.first().map(|e| e.when);
    }

    fn handle_events(&mut self, n: usize) {
        for i in 0..n {
            let ev = self.pollset[i];
            if ev.sock == self.pipe_reader.as_socket() {
                if let Err(err) = self.handle_pipe_event() {
                    self.handle_error(&err);
                }
                continue;
            }
            if ev.erroneous {
                self.dispatch(
                    ev.sock,
                    Dispatch::Error(Error::Socket(io::Error::other(
                        "error or hangup reported by the kernel",
                    ))),
                );
                continue;
            }
            if ev.readable {
                self.dispatch(ev.sock, Dispatch::Read);
            }
            if ev.writable {
                self.dispatch(ev.sock, Dispatch::Write);
            }
        }
    }

    /// Runs one manager callback. The slot is taken out of the map for the
    /// duration so the callback can borrow the rest of the multiplexer
    /// through [`MpxCtx`]; a socket no longer in the map is silently
    /// skipped (it raced with a deletion).
    fn dispatch(&mut self, sock: Socket, what: Dispatch) {
        let Some(mut slot) = self.managers.remove(&sock) else {
            return;
        };
        let mut removed = false;
        let res = {
            let mut ctx = MpxCtx {
                poller: &mut self.poller,
                timeouts: &mut self.timeouts,
                current_timeout: &mut self.current_timeout,
                next_timeout_id: &mut self.next_timeout_id,
                pending: &mut self.pending,
                shutting_down: &mut self.shutting_down,
                cfg: &self.cfg,
                sock,
                interest: &mut slot.interest,
                removed: &mut removed,
            };
            match what {
                Dispatch::Init => slot.mgr.init(&mut ctx).map(|()| EventResult::Continue),
                Dispatch::Read => match slot.mgr.handle_read_event(&mut ctx) {
                    Ok(EventResult::Done) => ctx
                        .disable(Operation::READ, true)
                        .map(|()| EventResult::Done),
                    other => other,
                },
                Dispatch::Write => match slot.mgr.handle_write_event(&mut ctx) {
                    Ok(EventResult::Done) => ctx
                        .disable(Operation::WRITE, true)
                        .map(|()| EventResult::Done),
                    other => other,
                },
                Dispatch::Timeout(id) => slot.mgr.handle_timeout(&mut ctx, id),
                Dispatch::Error(err) => Err(err),
            }
        };
        match res {
            Ok(_) if removed => {
                let _ = self.poller.deregister(sock);
                debug!(sock = sock.id, "manager removed");
            }
            Ok(_) => {
                self.managers.insert(sock, slot);
            }
            Err(err) => {
                slot.mgr.handle_error(&err);
                let _ = self.poller.deregister(sock);
                debug!(sock = sock.id, %err, "manager failed and was removed");
            }
        }
        self.apply_pending();
    }

    /// Registers managers queued by callbacks.
    fn apply_pending(&mut self) {
        while !self.pending.is_empty() {
            for (mgr, initial) in std::mem::take(&mut self.pending) {
                if let Err(err) = self.add(mgr, initial) {
                    self.handle_error(&err);
                }
            }
        }
    }

    fn remove(&mut self, sock: Socket) {
        if self.managers.remove(&sock).is_some() {
            let _ = self.poller.deregister(sock);
            debug!(sock = sock.id, "manager removed");
        }
    }

    // -- wakeup pipe --------------------------------------------------------

    /// Decodes and applies one control frame. Frames are written atomically
    /// (single write, bounded by PIPE_BUF), so once the length prefix is
    /// readable the body is too.
    fn handle_pipe_event(&mut self) -> Result<()> {
        let mut len_buf = [0u8; 4];
        match self.pipe_reader.read(&mut len_buf) {
            Ok(0) => {
                // Writer end gone; stop watching the pipe.
                let _ = self.poller.deregister(self.pipe_reader.as_socket());
                return Ok(());
            }
            Ok(4) => {}
            Ok(k) => {
                return Err(Error::Runtime(format!(
                    "short control frame length read: {k} bytes"
                )));
            }
            Err(e) if socket::is_temporary(&e) => return Ok(()),
            Err(e) => {
                return Err(Error::Runtime(format!("wakeup pipe read failed: {e}")));
            }
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len == 0 || len > MAX_BODY_LEN {
            return Err(Error::Runtime(format!("bad control frame length {len}")));
        }
        let mut body = vec![0u8; len];
        let mut off = 0;
        while off < len {
            match self.pipe_reader.read(&mut body[off..]) {
                Ok(0) => {
                    return Err(Error::Runtime(
                        "wakeup pipe closed mid-frame".to_string(),
                    ));
                }
                Ok(k) => off += k,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(Error::Runtime(format!("wakeup pipe read failed: {e}")));
                }
            }
        }

        let frame = ControlFrame::decode(&body)?;
        trace!(?frame, "control frame received");
        self.apply_frame(frame)
    }

    fn apply_frame(&mut self, frame: ControlFrame) -> Result<()> {
        match frame {
            ControlFrame::Shutdown => {
                self.shutting_down = true;
                Ok(())
            }
            ControlFrame::Add {
                socket_id,
                factory_key,
                args,
            } => {
                let sock = Socket::new(socket_id);
                let mgr = self.factory.make(sock, factory_key, &args, &self.cfg)?;
                self.add(mgr, Operation::READ)
            }
            ControlFrame::Enable { socket_id, op } => self.enable(Socket::new(socket_id), op),
            ControlFrame::Disable {
                socket_id,
                op,
                remove,
            } => self.disable(Socket::new(socket_id), op, remove),
            ControlFrame::SetTimeout {
                socket_id,
                when_ns_since_epoch,
            } => {
                self.set_timeout(Socket::new(socket_id), when_from_ns(when_ns_since_epoch));
                Ok(())
            }
            ControlFrame::CancelTimeout { id } => {
                self.cancel_timeout(id);
                Ok(())
            }
        }
    }

    // -- shutdown -----------------------------------------------------------

    /// Drops queued-but-unregistered managers, then closes every socket in
    /// the map and clears it. Managers close their sockets on drop.
    fn drain(&mut self) {
        self.pending.clear();
        let socks: Vec<Socket> = self.managers.keys().copied().collect();
        for sock in socks {
            let _ = self.poller.deregister(sock);
        }
        self.managers.clear();
        self.timeouts.clear();
        self.current_timeout = None;
        debug!("multiplexer drained");
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        socket::close(self.pipe_reader.as_socket());
        if !self.writer_detached {
            socket::close(self.pipe_writer.as_socket());
        }
    }
}

/// Converts a frame timestamp to a wall-clock time point. Timestamps
/// before the epoch clamp to the epoch (and thus fire immediately).
fn when_from_ns(ns: i64) -> SystemTime {
    if ns <= 0 {
        UNIX_EPOCH
    } else {
        UNIX_EPOCH + Duration::from_nanos(ns as u64)
    }
}

/// Inverse of [`when_from_ns`], saturating at the representable range.
pub(crate) fn ns_from_when(when: SystemTime) -> i64 {
    match when.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}

/// Cheap, cloneable handle for posting control frames to a running loop
/// from any thread. Writes are single atomic pipe writes; when the pipe
/// fills because the loop is behind, senders block until it drains.
#[derive(Clone, Copy)]
pub struct ControlSender {
    writer: PipeSocket,
}

impl ControlSender {
    pub fn send(&self, frame: &ControlFrame) -> Result<()> {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf)?;
        let n = self.writer.write(&buf)?;
        if n != buf.len() {
            return Err(Error::Runtime(format!(
                "short write on wakeup pipe: {n} of {} bytes",
                buf.len()
            )));
        }
        Ok(())
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(&ControlFrame::Shutdown)
    }

    /// Hands `sock` to the loop; its manager is built by the factory from
    /// `factory_key` and `args` and registered with read interest.
    pub fn add(&self, sock: Socket, factory_key: u16, args: &[u8]) -> Result<()> {
        self.send(&ControlFrame::Add {
            socket_id: sock.id,
            factory_key,
            args: args.to_vec(),
        })
    }

    pub fn enable(&self, sock: Socket, op: Operation) -> Result<()> {
        self.send(&ControlFrame::Enable {
            socket_id: sock.id,
            op,
        })
    }

    pub fn disable(&self, sock: Socket, op: Operation, remove: bool) -> Result<()> {
        self.send(&ControlFrame::Disable {
            socket_id: sock.id,
            op,
            remove,
        })
    }

    /// Schedules a timeout for `sock`'s manager. The id is not reported
    /// back; managers that need it schedule from the loop thread instead.
    pub fn set_timeout(&self, sock: Socket, when: SystemTime) -> Result<()> {
        self.send(&ControlFrame::SetTimeout {
            socket_id: sock.id,
            when_ns_since_epoch: ns_from_when(when),
        })
    }

    pub fn cancel_timeout(&self, id: u64) -> Result<()> {
        self.send(&ControlFrame::CancelTimeout { id })
    }
}

/// External surface of a started multiplexer: shutdown, liveness, joining,
/// and control-frame senders.
pub struct MultiplexerHandle {
    running: Arc<AtomicBool>,
    sender: ControlSender,
    writer: Option<PipeSocket>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MultiplexerHandle {
    /// Whether the loop thread is still running.
    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn sender(&self) -> ControlSender {
        self.sender
    }

    /// Posts a shutdown frame; the loop observes it on its next iteration.
    pub fn shutdown(&self) {
        if let Err(err) = self.sender.shutdown() {
            warn!(%err, "shutdown request could not be delivered");
        }
    }

    /// Blocks until the loop thread has drained and exited.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        if let Some(writer) = self.writer.take() {
            socket::close(writer.as_socket());
        }
    }
}

impl Drop for MultiplexerHandle {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            socket::close(writer.as_socket());
        }
    }
}
