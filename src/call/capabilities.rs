//! Seams to the media stack. The session never touches devices or
//! transports directly; it drives these traits and hears back through
//! [`PeerEvents`].

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use crate::call::call_error::CallError;
use crate::call::call_event::CallEvent;
use crate::call::call_state::ConnectivityState;
use crate::signaling::protocol::{AddressCandidate, SessionDescription};

/// An acquired local or remote media stream. Dropping it does not release
/// the device; `stop` does.
pub trait MediaStream: Send + Debug {
    fn id(&self) -> &str;
    fn stop(&mut self);
}

/// Capture devices (camera + microphone).
pub trait MediaSource: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn MediaStream>, CallError>;
}

/// One peer-to-peer transport, owned by exactly one session.
pub trait PeerConnection: Send {
    fn add_local_stream(&mut self, stream: &dyn MediaStream) -> Result<(), CallError>;
    fn create_offer(&mut self) -> Result<SessionDescription, CallError>;
    fn create_answer(&mut self) -> Result<SessionDescription, CallError>;
    fn set_local_description(&mut self, desc: &SessionDescription) -> Result<(), CallError>;
    fn set_remote_description(&mut self, desc: &SessionDescription) -> Result<(), CallError>;
    fn add_candidate(&mut self, candidate: &AddressCandidate) -> Result<(), CallError>;
    fn close(&mut self);
}

pub trait PeerConnectionFactory: Send + Sync {
    /// `events` is how the connection reports candidates, connectivity and
    /// remote media back to its session.
    fn create(&self, events: PeerEvents) -> Result<Box<dyn PeerConnection>, CallError>;
}

/// Callback side of a peer connection: feeds the owning session's queue.
///
/// Sends after the session is gone are dropped.
#[derive(Debug, Clone)]
pub struct PeerEvents {
    tx: Sender<CallEvent>,
}

impl PeerEvents {
    pub fn new(tx: Sender<CallEvent>) -> Self {
        Self { tx }
    }

    pub fn local_candidate(&self, candidate: AddressCandidate) {
        let _ = self.tx.send(CallEvent::LocalCandidate(candidate));
    }

    pub fn connectivity(&self, state: ConnectivityState) {
        let _ = self.tx.send(CallEvent::Connectivity(state));
    }

    pub fn remote_stream(&self, stream: Box<dyn MediaStream>) {
        let _ = self.tx.send(CallEvent::RemoteStream(stream));
    }
}

/// The pair of capabilities every session needs.
#[derive(Clone)]
pub struct CallCapabilities {
    pub media: Arc<dyn MediaSource>,
    pub peers: Arc<dyn PeerConnectionFactory>,
}
