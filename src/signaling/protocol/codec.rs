use super::{MAX_BODY_LEN, MsgType, ProtoError, SignalingMsg};

// ---- Encode to body bytes -------------------------------------------------

/// Serialize a message into its frame type byte and JSON body.
pub fn encode_msg(msg: &SignalingMsg) -> Result<(MsgType, Vec<u8>), ProtoError> {
    let body = serde_json::to_vec(msg)?;
    if body.len() > MAX_BODY_LEN {
        return Err(ProtoError::TooLarge);
    }
    Ok((MsgType::of(msg), body))
}

// ---- Decode from body bytes ----------------------------------------------

/// Parse a JSON body and check it against the type byte from the header.
pub fn decode_msg(msg_type: MsgType, body: &[u8]) -> Result<SignalingMsg, ProtoError> {
    let msg: SignalingMsg = serde_json::from_slice(body)?;
    let body_type = MsgType::of(&msg);
    if body_type != msg_type {
        return Err(ProtoError::TypeMismatch {
            header: msg_type,
            body: body_type,
        });
    }
    Ok(msg)
}
