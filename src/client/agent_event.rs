use crate::call::CallUpdate;
use crate::signaling::protocol::ParticipantId;

/// What [`CallAgent::poll`](crate::client::CallAgent::poll) hands the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Fresh presence snapshot from the relay (sorted).
    Online(Vec<ParticipantId>),
    /// Something happened to the current call.
    Call(CallUpdate),
    /// The relay connection is gone; any live call has been hung up.
    Disconnected { reason: String },
}
