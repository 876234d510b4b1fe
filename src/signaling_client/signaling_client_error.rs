use std::{fmt, io};

use crate::signaling::protocol::FrameError;

/// Errors that can occur while connecting to the relay or sending through it.
///
/// Once connected, the only thing `send()` can reliably report is that the
/// signaling client is disconnected (i.e. the network thread has exited and
/// dropped its command receiver).
#[derive(Debug)]
pub enum SignalingClientError {
    Io(io::Error),
    Frame(FrameError),
    InvalidServerName(String),
    Tls(String),
    Disconnected,
}

impl fmt::Display for SignalingClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Frame(e) => write!(f, "protocol error: {e}"),
            Self::InvalidServerName(name) => write!(f, "invalid TLS server name {name:?}"),
            Self::Tls(e) => write!(f, "TLS error: {e}"),
            Self::Disconnected => write!(f, "signaling client disconnected"),
        }
    }
}

impl std::error::Error for SignalingClientError {}

impl From<io::Error> for SignalingClientError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<FrameError> for SignalingClientError {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

impl From<rustls::Error> for SignalingClientError {
    fn from(e: rustls::Error) -> Self {
        Self::Tls(e.to_string())
    }
}
