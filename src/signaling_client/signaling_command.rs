use crate::signaling::protocol::SignalingMsg;
use crate::signaling::transport::Outgoing;

/// Commands issued by the application into the signaling client's network thread.
#[derive(Debug)]
pub enum SignalingCommand {
    Send(SignalingMsg),
    Disconnect,
}

impl Outgoing for SignalingCommand {
    fn into_msg(self) -> Option<SignalingMsg> {
        match self {
            SignalingCommand::Send(msg) => Some(msg),
            SignalingCommand::Disconnect => None,
        }
    }
}
