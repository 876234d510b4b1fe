use std::fmt;

use crate::signaling::protocol::{ParticipantId, ProtoError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Capture device denied or missing.
    MediaUnavailable(String),
    /// Target is not online.
    PeerUnreachable(ParticipantId),
    /// Transport failed or a peer-connection operation was rejected.
    NegotiationFailed(String),
    /// Transport reported `disconnected`; may still recover.
    TransientDisconnect,
    /// A live session already exists.
    AlreadyInCall,
    /// The session's worker is gone.
    SessionClosed,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::MediaUnavailable(why) => write!(f, "local media unavailable: {why}"),
            CallError::PeerUnreachable(id) => write!(f, "{id} is not reachable"),
            CallError::NegotiationFailed(why) => write!(f, "negotiation failed: {why}"),
            CallError::TransientDisconnect => write!(f, "connection interrupted"),
            CallError::AlreadyInCall => write!(f, "already in a call"),
            CallError::SessionClosed => write!(f, "call session is closed"),
        }
    }
}

impl std::error::Error for CallError {}

/// A payload that does not decode (or encode) cannot be negotiated.
impl From<ProtoError> for CallError {
    fn from(e: ProtoError) -> Self {
        CallError::NegotiationFailed(format!("bad payload: {e}"))
    }
}

/// Why a session reached `Ended`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    LocalHangup,
    /// Callee declined while ringing.
    Rejected,
    /// Caller gave up while dialing.
    Cancelled,
    RemoteHangup,
    /// Dial timeout elapsed.
    Unanswered,
    /// Transport reported `closed`.
    TransportClosed,
    Failed(CallError),
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::LocalHangup => write!(f, "hung up"),
            EndReason::Rejected => write!(f, "rejected"),
            EndReason::Cancelled => write!(f, "cancelled"),
            EndReason::RemoteHangup => write!(f, "remote hung up"),
            EndReason::Unanswered => write!(f, "no answer"),
            EndReason::TransportClosed => write!(f, "transport closed"),
            EndReason::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}
