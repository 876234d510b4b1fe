use std::sync::mpsc::Sender;

use crate::signaling::protocol::SignalingMsg;
use crate::signaling_client::{SignalingClientError, SignalingSender};

/// Where a session's outgoing signaling goes.
pub trait SignalSink: Send + Sync {
    fn send_signal(&self, msg: SignalingMsg) -> Result<(), SignalingClientError>;
}

impl SignalSink for SignalingSender {
    fn send_signal(&self, msg: SignalingMsg) -> Result<(), SignalingClientError> {
        self.send(msg)
    }
}

/// In-process wiring (tests, embedding without a socket).
impl SignalSink for Sender<SignalingMsg> {
    fn send_signal(&self, msg: SignalingMsg) -> Result<(), SignalingClientError> {
        self.send(msg)
            .map_err(|_| SignalingClientError::Disconnected)
    }
}
