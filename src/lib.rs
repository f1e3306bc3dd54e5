//! Reactor-style network I/O driver.
//!
//! A single-threaded event loop multiplexes a dynamic population of
//! non-blocking sockets, dispatches readiness to per-connection
//! [`SocketManager`] state machines, fires wall-clock timeouts in
//! deterministic `(when, id)` order, and accepts table mutations from other
//! threads through length-prefixed control frames on an internal wakeup
//! pipe. Connection behavior is composed from a byte-level [`Transport`]
//! and a protocol-level [`Application`].

pub mod acceptor;
pub mod application;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod manager;
pub mod multiplexer;
pub mod operation;
pub mod poll;
pub mod receive_policy;
pub mod socket;
pub mod timeout;
pub mod transport;

// Public API re-exports
pub use acceptor::Acceptor;
pub use application::{AppCtx, Application};
pub use codec::{BinaryDeserializer, BinarySerializer, Decode, Encode};
pub use config::Config;
pub use endpoint::V4Endpoint;
pub use error::{Error, Result};
pub use frame::ControlFrame;
pub use manager::{EventResult, MpxCtx, SocketManager, SocketManagerFactory};
pub use multiplexer::{ControlSender, Multiplexer, MultiplexerHandle};
pub use operation::Operation;
pub use receive_policy::ReceivePolicy;
pub use socket::{
    PipeSocket, Socket, SocketGuard, StreamSocket, TcpAcceptSocket, TcpStreamSocket,
    make_connected_tcp_stream_socket, make_tcp_accept_socket, pipe_socket_pair,
    stream_socket_pair,
};
pub use timeout::TimeoutEntry;
pub use transport::Transport;
