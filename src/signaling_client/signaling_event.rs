use crate::signaling::protocol::SignalingMsg;

/// What the network thread reports back to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    /// A message from the relay (online sets and routed call messages).
    Message(SignalingMsg),
    /// The connection is gone; no further events follow.
    Disconnected { reason: String },
}
