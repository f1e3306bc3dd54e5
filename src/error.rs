use std::fmt;
use std::io;

/// Errors surfaced by the multiplexer and its socket managers.
#[derive(Debug)]
pub enum Error {
    /// Unexpected condition; fatal to the event loop.
    Runtime(String),
    /// A socket operation failed. Recoverable at the manager level;
    /// `WouldBlock` means "not ready" and is never stored in this variant.
    Socket(io::Error),
    /// Programmer error, surfaced to the caller.
    InvalidArgument(String),
}

/// Crate-wide result alias. `Ok(())` is the success sentinel.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error must stop the event loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Runtime(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Runtime(msg) => write!(f, "runtime error: {msg}"),
            Error::Socket(e) => write!(f, "socket operation failed: {e}"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Socket(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Socket(e)
    }
}
