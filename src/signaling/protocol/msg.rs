// ---- Public message enum --------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::signaling::protocol::{ParticipantId, Payload, ProtoError};

/// Every message exchanged between clients and the relay.
///
/// The four routed kinds (`call-request`, `call-accepted`,
/// `address-candidate`, `call-ended`) carry `from`/`to` and an opaque
/// [`Payload`]; the relay forwards them verbatim. The rest are control
/// traffic between a client and the relay itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", try_from = "WireMsg")]
pub enum SignalingMsg {
    // Handshake: binds the connection to a participant id.
    Hello {
        #[serde(rename = "participantId")]
        participant_id: ParticipantId,
    },

    // Presence (relay -> clients)
    OnlineSet {
        #[serde(rename = "participantIds")]
        participant_ids: Vec<ParticipantId>,
    },

    // Call signaling
    CallRequest {
        from: ParticipantId,
        to: ParticipantId,
        payload: Payload,
    },
    CallAccepted {
        from: ParticipantId,
        to: ParticipantId,
        payload: Payload,
    },
    AddressCandidate {
        from: ParticipantId,
        to: ParticipantId,
        payload: Payload,
    },
    CallEnded {
        from: ParticipantId,
        to: ParticipantId,
        payload: Payload,
    },

    // Keepalive
    Ping {
        nonce: u64,
    },
    Pong {
        nonce: u64,
    },
}

// ---- Wire view --------------------------------------------------------------

/// Flat shape of any message body.
///
/// Decoding goes through this plain struct so the raw payload is read
/// straight from the input; a tagged enum would buffer it first.
#[derive(Deserialize)]
struct WireMsg {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "participantId")]
    participant_id: Option<ParticipantId>,
    #[serde(rename = "participantIds")]
    participant_ids: Option<Vec<ParticipantId>>,
    from: Option<ParticipantId>,
    to: Option<ParticipantId>,
    payload: Option<Payload>,
    nonce: Option<u64>,
}

impl WireMsg {
    /// `from`, `to` and the payload (`null` when absent).
    fn route(self) -> Result<(ParticipantId, ParticipantId, Payload), ProtoError> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Ok((from, to, self.payload.unwrap_or_default())),
            _ => Err(ProtoError::InvalidFormat("routed message without from/to")),
        }
    }
}

impl TryFrom<WireMsg> for SignalingMsg {
    type Error = ProtoError;

    fn try_from(mut wire: WireMsg) -> Result<Self, Self::Error> {
        let kind = std::mem::take(&mut wire.kind);
        let msg = match kind.as_str() {
            "hello" => SignalingMsg::Hello {
                participant_id: wire
                    .participant_id
                    .ok_or(ProtoError::InvalidFormat("hello without participantId"))?,
            },
            "online-set" => SignalingMsg::OnlineSet {
                participant_ids: wire
                    .participant_ids
                    .ok_or(ProtoError::InvalidFormat("online-set without participantIds"))?,
            },
            "call-request" => {
                let (from, to, payload) = wire.route()?;
                SignalingMsg::CallRequest { from, to, payload }
            }
            "call-accepted" => {
                let (from, to, payload) = wire.route()?;
                SignalingMsg::CallAccepted { from, to, payload }
            }
            "address-candidate" => {
                let (from, to, payload) = wire.route()?;
                SignalingMsg::AddressCandidate { from, to, payload }
            }
            "call-ended" => {
                let (from, to, payload) = wire.route()?;
                SignalingMsg::CallEnded { from, to, payload }
            }
            "ping" => SignalingMsg::Ping {
                nonce: wire.nonce.ok_or(ProtoError::InvalidFormat("ping without nonce"))?,
            },
            "pong" => SignalingMsg::Pong {
                nonce: wire.nonce.ok_or(ProtoError::InvalidFormat("pong without nonce"))?,
            },
            _ => return Err(ProtoError::InvalidFormat("unknown message type")),
        };
        Ok(msg)
    }
}

impl SignalingMsg {
    pub fn call_ended(from: impl Into<ParticipantId>, to: impl Into<ParticipantId>) -> Self {
        Self::CallEnded {
            from: from.into(),
            to: to.into(),
            payload: Payload::null(),
        }
    }

    /// `(from, to)` for routed messages, `None` for control traffic.
    pub fn route(&self) -> Option<(&ParticipantId, &ParticipantId)> {
        match self {
            SignalingMsg::CallRequest { from, to, .. }
            | SignalingMsg::CallAccepted { from, to, .. }
            | SignalingMsg::AddressCandidate { from, to, .. }
            | SignalingMsg::CallEnded { from, to, .. } => Some((from, to)),
            SignalingMsg::Hello { .. }
            | SignalingMsg::OnlineSet { .. }
            | SignalingMsg::Ping { .. }
            | SignalingMsg::Pong { .. } => None,
        }
    }

    /// Short variant name for logging.
    /// We avoid logging full SDP/candidates.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMsg::Hello { .. } => "hello",
            SignalingMsg::OnlineSet { .. } => "online-set",
            SignalingMsg::CallRequest { .. } => "call-request",
            SignalingMsg::CallAccepted { .. } => "call-accepted",
            SignalingMsg::AddressCandidate { .. } => "address-candidate",
            SignalingMsg::CallEnded { .. } => "call-ended",
            SignalingMsg::Ping { .. } => "ping",
            SignalingMsg::Pong { .. } => "pong",
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::signaling::protocol::{AddressCandidate, SessionDescription};
    use serde_json::json;

    #[test]
    fn call_request_uses_wire_field_names() {
        let msg = SignalingMsg::CallRequest {
            from: "alice".into(),
            to: "bob".into(),
            payload: Payload::encode(&SessionDescription::offer("v=0")).unwrap(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "call-request",
                "from": "alice",
                "to": "bob",
                "payload": { "type": "offer", "sdp": "v=0" }
            })
        );
    }

    #[test]
    fn call_ended_payload_is_null_and_may_be_omitted() {
        let msg = SignalingMsg::call_ended("bob", "alice");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["payload"], serde_json::Value::Null);

        let parsed: SignalingMsg =
            serde_json::from_str(r#"{"type":"call-ended","from":"bob","to":"alice"}"#).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn candidate_accepts_browser_shaped_payload() {
        let raw = r#"{
            "type": "address-candidate",
            "from": "bob",
            "to": "alice",
            "payload": {"candidate":"candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host","sdpMid":"0","sdpMLineIndex":0,"usernameFragment":"f00d"}
        }"#;
        let parsed: SignalingMsg = serde_json::from_str(raw).unwrap();
        match &parsed {
            SignalingMsg::AddressCandidate { payload, .. } => {
                let candidate: AddressCandidate = payload.decode().unwrap();
                assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
                assert_eq!(candidate.sdp_mline_index, Some(0));
            }
            other => panic!("expected AddressCandidate, got {:?}", other),
        }
        // re-encoding keeps the field the endpoint struct ignores
        let out = serde_json::to_string(&parsed).unwrap();
        assert!(out.contains(r#""usernameFragment":"f00d""#));
    }

    #[test]
    fn routed_payload_is_not_validated() {
        let raw = r#"{"type":"call-request","from":"a","to":"b","payload":{"type":"pranswer","sdp":"x"}}"#;
        let parsed: SignalingMsg = serde_json::from_str(raw).unwrap();
        assert_eq!(serde_json::to_string(&parsed).unwrap(), raw);

        let null_payload: SignalingMsg =
            serde_json::from_str(r#"{"type":"call-request","from":"a","to":"b","payload":null}"#)
                .unwrap();
        match null_payload {
            SignalingMsg::CallRequest { payload, .. } => assert!(payload.is_null()),
            other => panic!("expected CallRequest, got {:?}", other),
        }
    }

    #[test]
    fn envelope_errors_are_rejected() {
        assert!(serde_json::from_str::<SignalingMsg>(r#"{"type":"call-ended","to":"b"}"#).is_err());
        assert!(serde_json::from_str::<SignalingMsg>(r#"{"type":"shout","from":"a"}"#).is_err());
        assert!(serde_json::from_str::<SignalingMsg>(r#"{"type":"ping"}"#).is_err());
    }

    #[test]
    fn online_set_uses_camel_case_ids() {
        let msg = SignalingMsg::OnlineSet {
            participant_ids: vec!["alice".into()],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({ "type": "online-set", "participantIds": ["alice"] }));
        assert!(msg.route().is_none());
    }
}
