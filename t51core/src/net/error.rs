use std::fmt;
use std::io;

/// Error kinds surfaced by the reliable-UDP host's public operations. The host never panics;
/// every fallible constructor or lifecycle call returns one of these instead.
#[derive(Debug)]
pub enum Error {
    /// Bad bind/connect address, or the socket/library could not be created.
    Configuration(String),
    /// Allocation failure, event ring full, or session table full.
    ResourceExhausted(String),
    /// `client_connect` was called on a server host, or while already connected.
    InvalidRole,
    /// `connect_timeout` elapsed without observing a Connect event.
    Timeout,
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Error::ResourceExhausted(msg) => write!(f, "resource exhausted: {}", msg),
            Error::InvalidRole => write!(f, "operation not valid for this host's role/state"),
            Error::Timeout => write!(f, "operation timed out"),
            Error::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;
