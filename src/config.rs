/// Configuration for the multiplexer and the managers it drives.
///
/// A reference is handed to every manager's `init` via the callback context.
#[derive(Clone, Debug)]
pub struct Config {
    /// TCP listen backlog.
    pub backlog: i32,
    /// Enable SO_KEEPALIVE on accepted and dialed stream sockets.
    pub keepalive: bool,
    /// Enable TCP_NODELAY on accepted and dialed stream sockets.
    pub tcp_nodelay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backlog: 1024,
            keepalive: false,
            tcp_nodelay: true,
        }
    }
}
