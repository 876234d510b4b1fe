// ---- Message type byte ----------------------------------------------------

use crate::signaling::protocol::{ProtoError, SignalingMsg};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum MsgType {
    Hello = 0x01,
    OnlineSet = 0x02,

    CallRequest = 0x20,
    CallAccepted = 0x21,
    AddressCandidate = 0x22,
    CallEnded = 0x24,

    Ping = 0x30,
    Pong = 0x31,
}

impl MsgType {
    pub fn from_u8(v: u8) -> Result<MsgType, ProtoError> {
        use MsgType::*;
        match v {
            0x01 => Ok(Hello),
            0x02 => Ok(OnlineSet),
            0x20 => Ok(CallRequest),
            0x21 => Ok(CallAccepted),
            0x22 => Ok(AddressCandidate),
            0x24 => Ok(CallEnded),
            0x30 => Ok(Ping),
            0x31 => Ok(Pong),
            other => Err(ProtoError::UnknownType(other)),
        }
    }

    pub fn of(msg: &SignalingMsg) -> MsgType {
        match msg {
            SignalingMsg::Hello { .. } => MsgType::Hello,
            SignalingMsg::OnlineSet { .. } => MsgType::OnlineSet,
            SignalingMsg::CallRequest { .. } => MsgType::CallRequest,
            SignalingMsg::CallAccepted { .. } => MsgType::CallAccepted,
            SignalingMsg::AddressCandidate { .. } => MsgType::AddressCandidate,
            SignalingMsg::CallEnded { .. } => MsgType::CallEnded,
            SignalingMsg::Ping { .. } => MsgType::Ping,
            SignalingMsg::Pong { .. } => MsgType::Pong,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
