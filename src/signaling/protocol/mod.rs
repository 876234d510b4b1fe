//! Wire protocol between clients and the relay.
//!
//! Every message is one frame: an 8-byte header followed by a JSON body.
mod codec;
mod constants;
mod errors;
mod framing;
mod msg;
mod msg_type;
mod types;

use std::io::{Read, Write};

pub use codec::{decode_msg, encode_msg};
pub use constants::{HEADER_LEN, MAX_BODY_LEN, PROTO_VERSION};
pub use errors::{FrameError, ProtoError};
pub use framing::{FrameBuffer, read_frame, write_frame};
pub use msg::SignalingMsg;
pub use msg_type::MsgType;
pub use types::{AddressCandidate, ParticipantId, Payload, SdpKind, SessionDescription};

/// Encode and write one message as a frame.
pub fn write_msg<W: Write>(w: &mut W, msg: &SignalingMsg) -> Result<(), FrameError> {
    let (msg_type, body) = encode_msg(msg)?;
    write_frame(w, msg_type, &body)?;
    Ok(())
}

/// Read one frame and decode it (blocking).
pub fn read_msg<R: Read>(r: &mut R) -> Result<SignalingMsg, FrameError> {
    let (msg_type, body) = read_frame(r, MAX_BODY_LEN)?;
    Ok(decode_msg(msg_type, &body)?)
}
