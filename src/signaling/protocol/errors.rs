use std::{fmt, io};

use crate::signaling::protocol::MsgType;

/// Protocol-level errors (body parsing/format issues, etc.).
#[derive(Debug)]
pub enum ProtoError {
    UnknownType(u8),
    TooLarge,
    InvalidFormat(&'static str),
    Json(String),
    /// Header type byte disagrees with the JSON `type` tag.
    TypeMismatch { header: MsgType, body: MsgType },
}

impl fmt::Display for ProtoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtoError::UnknownType(b) => write!(f, "unknown message type 0x{b:02x}"),
            ProtoError::TooLarge => write!(f, "frame body too large"),
            ProtoError::InvalidFormat(why) => write!(f, "invalid frame: {why}"),
            ProtoError::Json(e) => write!(f, "invalid JSON body: {e}"),
            ProtoError::TypeMismatch { header, body } => {
                write!(f, "header says {header:?} but body is {body:?}")
            }
        }
    }
}

impl std::error::Error for ProtoError {}

impl From<serde_json::Error> for ProtoError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Frame-level error wrapper: IO vs protocol.
#[derive(Debug)]
pub enum FrameError {
    Io(io::Error),
    Proto(ProtoError),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Io(e) => write!(f, "IO error: {e}"),
            FrameError::Proto(e) => write!(f, "protocol error: {e}"),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ProtoError> for FrameError {
    fn from(e: ProtoError) -> Self {
        Self::Proto(e)
    }
}
