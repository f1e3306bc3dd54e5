use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use netmux::socket::{AsSocket, StreamSocket, close, make_socket_guard, stream_socket_pair};
use netmux::{
    Config, Error, EventResult, MpxCtx, Multiplexer, Operation, Result, Socket, SocketGuard,
    SocketManager, SocketManagerFactory,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Factory for multiplexers that never receive an `add` frame.
struct NullFactory;

impl SocketManagerFactory for NullFactory {
    fn make(
        &mut self,
        _sock: Socket,
        key: u16,
        _args: &[u8],
        _cfg: &Config,
    ) -> Result<Box<dyn SocketManager>> {
        Err(Error::InvalidArgument(format!("unknown factory key {key}")))
    }
}

/// Manager that records timeout firings and stays registered for read.
struct RecordingManager {
    sock: SocketGuard<StreamSocket>,
    fired: Arc<Mutex<Vec<(u64, SystemTime)>>>,
}

impl SocketManager for RecordingManager {
    fn socket(&self) -> Socket {
        self.sock.socket()
    }

    fn handle_read_event(&mut self, _ctx: &mut MpxCtx<'_>) -> Result<EventResult> {
        Ok(EventResult::Continue)
    }

    fn handle_timeout(&mut self, _ctx: &mut MpxCtx<'_>, id: u64) -> Result<EventResult> {
        self.fired.lock().unwrap().push((id, SystemTime::now()));
        Ok(EventResult::Continue)
    }
}

/// Manager whose only job is to flag that `init` ran on the loop thread.
struct InitProbe {
    sock: SocketGuard<StreamSocket>,
    inits: Arc<AtomicUsize>,
}

impl SocketManager for InitProbe {
    fn socket(&self) -> Socket {
        self.sock.socket()
    }

    fn init(&mut self, _ctx: &mut MpxCtx<'_>) -> Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn handle_read_event(&mut self, _ctx: &mut MpxCtx<'_>) -> Result<EventResult> {
        Ok(EventResult::Continue)
    }
}

struct ProbeFactory {
    inits: Arc<AtomicUsize>,
}

impl SocketManagerFactory for ProbeFactory {
    fn make(
        &mut self,
        sock: Socket,
        _key: u16,
        _args: &[u8],
        _cfg: &Config,
    ) -> Result<Box<dyn SocketManager>> {
        Ok(Box::new(InitProbe {
            sock: make_socket_guard(StreamSocket(sock)),
            inits: self.inits.clone(),
        }))
    }
}

#[test]
fn timer_fairness() {
    init_logging();
    let mut mpx = Multiplexer::new(Box::new(NullFactory), Config::default()).unwrap();

    let (managed, peer) = stream_socket_pair().unwrap();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let mgr = RecordingManager {
        sock: make_socket_guard(managed),
        fired: fired.clone(),
    };
    let sock = managed.as_socket();
    mpx.add(Box::new(mgr), Operation::READ).unwrap();

    // Schedule out of order; fires must come back in deadline order.
    let now = SystemTime::now();
    let id_50 = mpx.set_timeout(sock, now + Duration::from_millis(50));
    let id_10 = mpx.set_timeout(sock, now + Duration::from_millis(10));
    let id_30 = mpx.set_timeout(sock, now + Duration::from_millis(30));
    assert!(id_50 < id_10 && id_10 < id_30, "ids must be monotonic");

    let deadline = Instant::now() + Duration::from_secs(5);
    while fired.lock().unwrap().len() < 3 {
        assert!(Instant::now() < deadline, "timeouts never fired");
        mpx.poll_once(true).unwrap();
    }

    let fired = fired.lock().unwrap();
    let order: Vec<u64> = fired.iter().map(|(id, _)| *id).collect();
    assert_eq!(order, [id_10, id_30, id_50]);

    for ((_, at), target_ms) in fired.iter().zip([10u64, 30, 50]) {
        let elapsed = at.duration_since(now).unwrap_or(Duration::ZERO);
        let target = Duration::from_millis(target_ms);
        assert!(
            elapsed + Duration::from_millis(15) >= target,
            "fired {elapsed:?} before the {target:?} deadline"
        );
        assert!(
            elapsed <= target + Duration::from_millis(60),
            "fired {elapsed:?}, too long after the {target:?} deadline"
        );
    }

    close(peer.as_socket());
}

#[test]
fn cancelled_timeout_never_fires() {
    init_logging();
    let mut mpx = Multiplexer::new(Box::new(NullFactory), Config::default()).unwrap();

    let (managed, peer) = stream_socket_pair().unwrap();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sock = managed.as_socket();
    mpx.add(
        Box::new(RecordingManager {
            sock: make_socket_guard(managed),
            fired: fired.clone(),
        }),
        Operation::READ,
    )
    .unwrap();

    let now = SystemTime::now();
    let cancelled = mpx.set_timeout(sock, now + Duration::from_millis(10));
    let kept = mpx.set_timeout(sock, now + Duration::from_millis(20));
    mpx.cancel_timeout(cancelled);

    let deadline = Instant::now() + Duration::from_secs(5);
    while fired.lock().unwrap().len() < 1 {
        assert!(Instant::now() < deadline, "timeout never fired");
        mpx.poll_once(true).unwrap();
    }
    let order: Vec<u64> = fired.lock().unwrap().iter().map(|(id, _)| *id).collect();
    assert_eq!(order, [kept]);

    close(peer.as_socket());
}

#[test]
fn disable_with_remove_drops_the_manager() {
    init_logging();
    let mut mpx = Multiplexer::new(Box::new(NullFactory), Config::default()).unwrap();

    let (managed, peer) = stream_socket_pair().unwrap();
    let sock = managed.as_socket();
    mpx.add(
        Box::new(RecordingManager {
            sock: make_socket_guard(managed),
            fired: Arc::new(Mutex::new(Vec::new())),
        }),
        Operation::READ_WRITE,
    )
    .unwrap();
    assert_eq!(mpx.num_managers(), 1);

    mpx.disable(sock, Operation::READ_WRITE, true).unwrap();
    assert_eq!(mpx.num_managers(), 0, "manager must be gone before the next iteration");
    assert!(!mpx.contains(sock));

    // Readiness for the dropped (and closed) socket must not be dispatched
    // anywhere; the peer write may fail now, which is fine.
    let _ = peer.write(b"x");
    mpx.poll_once(false).unwrap();

    close(peer.as_socket());
}

#[test]
fn double_add_is_rejected() {
    init_logging();
    let mut mpx = Multiplexer::new(Box::new(NullFactory), Config::default()).unwrap();

    let (managed, peer) = stream_socket_pair().unwrap();
    mpx.add(
        Box::new(RecordingManager {
            sock: make_socket_guard(managed),
            fired: Arc::new(Mutex::new(Vec::new())),
        }),
        Operation::READ,
    )
    .unwrap();

    // Second registration under the same socket must fail.
    let dup = RecordingManager {
        sock: make_socket_guard(StreamSocket(managed.as_socket())),
        fired: Arc::new(Mutex::new(Vec::new())),
    };
    assert!(matches!(
        mpx.add(Box::new(dup), Operation::READ),
        Err(Error::InvalidArgument(_))
    ));

    close(peer.as_socket());
}

#[test]
fn nonblocking_poll_returns_promptly() {
    init_logging();
    let mut mpx = Multiplexer::new(Box::new(NullFactory), Config::default()).unwrap();

    let started = Instant::now();
    mpx.poll_once(false).unwrap();
    assert!(
        started.elapsed() < Duration::from_millis(100),
        "non-blocking poll took {:?}",
        started.elapsed()
    );
}

#[test]
fn cross_thread_add_via_control_frame() {
    init_logging();
    let inits = Arc::new(AtomicUsize::new(0));
    let mpx = Multiplexer::new(
        Box::new(ProbeFactory {
            inits: inits.clone(),
        }),
        Config::default(),
    )
    .unwrap();

    let mut handle = mpx.start().unwrap();
    assert!(handle.running());

    // Hand one end of a socketpair to the loop from this (non-loop) thread.
    let (given, kept) = stream_socket_pair().unwrap();
    handle.sender().add(given.as_socket(), 0, b"").unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while inits.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "manager was never initialized");
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(inits.load(Ordering::SeqCst), 1);

    handle.shutdown();
    handle.join();
    assert!(!handle.running());

    // The loop closed the manager's socket on drain: the kept end sees EOF.
    let mut buf = [0u8; 1];
    assert_eq!(kept.read(&mut buf).unwrap(), 0);
    close(kept.as_socket());
}

#[test]
fn shutdown_drains_and_joins() {
    init_logging();
    let mpx = Multiplexer::new(Box::new(NullFactory), Config::default()).unwrap();
    let mut handle = mpx.start().unwrap();
    assert!(handle.running());
    handle.shutdown();
    handle.join();
    assert!(!handle.running());
}
