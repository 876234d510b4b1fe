use crate::signaling::protocol::SignalingMsg;

/// Internal identifier for a connected client (TCP/TLS connection).
///
/// This is the relay's "connection handle": presence maps participants to it.
pub type ClientId = u64;

/// A message the relay wants to send to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMsg {
    pub client_id_target: ClientId,
    pub msg: SignalingMsg,
}
