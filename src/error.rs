//! Error taxonomy for the relay.
//!
//! `CodecError::IncompleteFrame` is the only recoverable error: the owning
//! session keeps buffering. Everything else ends the session that hit it.

use std::io;

/// Errors produced while encoding or decoding envelopes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The payload lacks the obfuscation prefix or its encoding is invalid.
    #[error("malformed obfuscated payload: {0}")]
    MalformedObfuscation(String),

    /// No header/body boundary yet; the caller must buffer more bytes.
    #[error("incomplete frame")]
    IncompleteFrame,

    /// The request line or headers could not be parsed.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}

/// Failure to open a connection to a next hop or destination.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("connection to {addr} refused")]
    Refused { addr: String },

    #[error("connection to {addr} timed out")]
    TimedOut { addr: String },

    #[error("{addr} unreachable: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: io::Error,
    },
}

impl ConnectError {
    /// Classify an I/O error returned by `TcpStream::connect`.
    pub fn from_io(addr: impl Into<String>, err: io::Error) -> Self {
        let addr = addr.into();
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ConnectError::Refused { addr },
            io::ErrorKind::TimedOut => ConnectError::TimedOut { addr },
            _ => ConnectError::Unreachable { addr, source: err },
        }
    }
}

/// Session-level error. Logged by the session task, never surfaced further.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("socket I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("upstream HTTP request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("refusing httpst destination {0}: insecure_skip_verify is disabled")]
    InsecureTlsDisabled(String),

    #[error("listener failed: {0}")]
    Listener(#[from] crate::net::listener::ListenerError),

    #[error("invalid relay setup: {0}")]
    Setup(String),
}

impl RelayError {
    /// Classify a `reqwest` failure: connect and timeout failures become
    /// [`ConnectError`], anything after the connection is an upstream error.
    pub fn from_upstream(addr: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Connect(ConnectError::TimedOut { addr: addr.to_string() })
        } else if err.is_connect() {
            RelayError::Connect(ConnectError::Unreachable {
                addr: addr.to_string(),
                source: io::Error::new(io::ErrorKind::Other, err.to_string()),
            })
        } else {
            RelayError::Upstream(err)
        }
    }
}
