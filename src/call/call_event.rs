use crate::call::call_error::{CallError, EndReason};
use crate::call::call_state::{ConnectivityState, SessionState};
use crate::call::capabilities::MediaStream;
use crate::call::CallId;
use crate::signaling::protocol::{AddressCandidate, ParticipantId, SignalingMsg};

/// Everything a session reacts to, delivered through its single queue.
#[derive(Debug)]
pub enum CallEvent {
    // Local user actions
    Initiate { peer: ParticipantId },
    Accept,
    Reject,
    HangUp,

    /// Routed signaling from the peer (`call-request`, `call-accepted`,
    /// `address-candidate`, `call-ended`).
    Inbound(SignalingMsg),

    // Peer connection callbacks
    LocalCandidate(AddressCandidate),
    Connectivity(ConnectivityState),
    RemoteStream(Box<dyn MediaStream>),

    /// Presence says the peer went offline.
    PeerOffline,
}

impl CallEvent {
    /// Short name for logging; never includes SDP or candidates.
    pub fn name(&self) -> &'static str {
        match self {
            CallEvent::Initiate { .. } => "initiate",
            CallEvent::Accept => "accept",
            CallEvent::Reject => "reject",
            CallEvent::HangUp => "hang-up",
            CallEvent::Inbound(msg) => msg.kind(),
            CallEvent::LocalCandidate(_) => "local-candidate",
            CallEvent::Connectivity(_) => "connectivity",
            CallEvent::RemoteStream(_) => "remote-stream",
            CallEvent::PeerOffline => "peer-offline",
        }
    }
}

/// What a session wants done after handling an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutput {
    /// Send to the relay.
    Signal(SignalingMsg),
    /// Tell the UI layer.
    Notice(CallNotice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallNotice {
    StateChanged(SessionState),
    ConnectivityChanged(ConnectivityState),
    Error(CallError),
    Ended { reason: EndReason },
}

/// A notice tagged with the call it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallUpdate {
    pub call_id: CallId,
    pub peer_id: ParticipantId,
    pub notice: CallNotice,
}
