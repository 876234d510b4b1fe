use std::sync::Arc;

use crate::log::NoopLogSink;
use crate::log::log_sink::LogSink;
use crate::signaling::presence::PresenceDirectory;
use crate::signaling::protocol::{ParticipantId, SignalingMsg};
use crate::signaling::types::{ClientId, OutgoingMsg};
use crate::{sink_debug, sink_info, sink_trace, sink_warn};

/// Pure relay state machine: presence bookkeeping plus call-control routing.
///
/// Nothing here touches sockets. Every entry point returns the messages to
/// deliver; the server loop owns delivery.
pub struct RelayEngine {
    presence: PresenceDirectory,
    log: Arc<dyn LogSink>,
}

impl Default for RelayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayEngine {
    pub fn new() -> Self {
        Self::with_log(Arc::new(NoopLogSink))
    }

    pub fn with_log(log: Arc<dyn LogSink>) -> Self {
        Self {
            presence: PresenceDirectory::new(),
            log,
        }
    }

    pub fn presence(&self) -> &PresenceDirectory {
        &self.presence
    }

    /// Main entrypoint: handle a message from a client.
    ///
    /// Returns a list of (target_client, msg) to send.
    pub fn handle(&mut self, from_cid: ClientId, msg: SignalingMsg) -> Vec<OutgoingMsg> {
        match msg {
            SignalingMsg::Hello { participant_id } => self.handle_hello(from_cid, participant_id),

            SignalingMsg::CallRequest { .. }
            | SignalingMsg::CallAccepted { .. }
            | SignalingMsg::AddressCandidate { .. }
            | SignalingMsg::CallEnded { .. } => self.forward_signaling(from_cid, msg),

            SignalingMsg::Ping { nonce } => vec![OutgoingMsg {
                client_id_target: from_cid,
                msg: SignalingMsg::Pong { nonce },
            }],

            SignalingMsg::OnlineSet { .. } | SignalingMsg::Pong { .. } => {
                sink_warn!(
                    self.log,
                    "ignoring relay-only msg from client {}: {}",
                    from_cid,
                    msg.kind()
                );
                Vec::new()
            }
        }
    }

    /// Called when a connection closes, to clean up presence.
    pub fn handle_disconnect(&mut self, client: ClientId) -> Vec<OutgoingMsg> {
        match self.presence.deregister_client(client) {
            Some(participant) => {
                sink_info!(
                    self.log,
                    "client {} ({}) disconnected; {} online",
                    client,
                    participant,
                    self.presence.len()
                );
                self.broadcast_online_set()
            }
            None => {
                sink_info!(
                    self.log,
                    "client {} disconnected (no presence entry)",
                    client
                );
                Vec::new()
            }
        }
    }

    /// Remove a participant by id (administrative removal).
    /// Absent participants are a no-op and broadcast nothing.
    pub fn deregister(&mut self, participant: &str) -> Vec<OutgoingMsg> {
        match self.presence.deregister(participant) {
            Some(client) => {
                sink_info!(
                    self.log,
                    "deregistered {} (client {})",
                    participant,
                    client
                );
                self.broadcast_online_set()
            }
            None => Vec::new(),
        }
    }

    // ---- Individual handlers ---------------------------------------------

    fn handle_hello(&mut self, client: ClientId, participant: ParticipantId) -> Vec<OutgoingMsg> {
        if participant.is_empty() {
            sink_warn!(self.log, "client {} sent hello with empty id", client);
            return Vec::new();
        }

        if let Some(prev) = self.presence.register(participant.clone(), client) {
            sink_info!(
                self.log,
                "{} reconnected: client {} replaces client {}",
                participant,
                client,
                prev
            );
        } else {
            sink_info!(self.log, "{} online as client {}", participant, client);
        }

        self.broadcast_online_set()
    }

    /// Forward a routed message to the connection of its `to` participant.
    ///
    /// Drops (with a log line, never a reply) when the sender has not said
    /// hello, when `from` is not the sender's own id, or when `to` is offline.
    fn forward_signaling(&mut self, from_cid: ClientId, msg: SignalingMsg) -> Vec<OutgoingMsg> {
        let Some(sender) = self.presence.participant_for(from_cid) else {
            sink_warn!(
                self.log,
                "client {} sent {} before hello; dropping",
                from_cid,
                msg.kind()
            );
            return Vec::new();
        };

        let Some((from, to)) = msg.route() else {
            sink_warn!(
                self.log,
                "forward_signaling received unroutable message {}",
                msg.kind()
            );
            return Vec::new();
        };

        if from != sender {
            sink_warn!(
                self.log,
                "client {} ({}) sent {} claiming to be {}; dropping",
                from_cid,
                sender,
                msg.kind(),
                from
            );
            return Vec::new();
        }

        let Some(target) = self.presence.lookup(to) else {
            sink_debug!(
                self.log,
                "{} from {} to offline {}; dropping",
                msg.kind(),
                from,
                to
            );
            return Vec::new();
        };

        sink_trace!(
            self.log,
            "relaying {} {} -> {} (client {} -> {})",
            msg.kind(),
            from,
            to,
            from_cid,
            target
        );

        vec![OutgoingMsg {
            client_id_target: target,
            msg,
        }]
    }

    /// Full, sorted online set to every registered connection.
    fn broadcast_online_set(&self) -> Vec<OutgoingMsg> {
        let participant_ids = self.presence.online_participants();
        self.presence
            .client_ids()
            .into_iter()
            .map(|client_id| OutgoingMsg {
                client_id_target: client_id,
                msg: SignalingMsg::OnlineSet {
                    participant_ids: participant_ids.clone(),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::signaling::protocol::{AddressCandidate, Payload, SessionDescription};

    fn hello(engine: &mut RelayEngine, client_id: ClientId, id: &str) -> Vec<OutgoingMsg> {
        engine.handle(
            client_id,
            SignalingMsg::Hello {
                participant_id: id.to_string(),
            },
        )
    }

    fn online_set_for(out: &[OutgoingMsg], client_id: ClientId) -> Vec<String> {
        let hits: Vec<_> = out
            .iter()
            .filter(|o| o.client_id_target == client_id)
            .collect();
        assert_eq!(hits.len(), 1, "expected one online-set for {client_id}");
        match &hits[0].msg {
            SignalingMsg::OnlineSet { participant_ids } => participant_ids.clone(),
            other => panic!("expected OnlineSet, got {:?}", other),
        }
    }

    fn call_request(from: &str, to: &str) -> SignalingMsg {
        SignalingMsg::CallRequest {
            from: from.into(),
            to: to.into(),
            payload: Payload::encode(&SessionDescription::offer("v=0")).unwrap(),
        }
    }

    #[test]
    fn hello_broadcasts_online_set_to_everyone() {
        let mut engine = RelayEngine::new();
        let out = hello(&mut engine, 1, "alice");
        assert_eq!(online_set_for(&out, 1), vec!["alice"]);

        let out = hello(&mut engine, 2, "bob");
        assert_eq!(out.len(), 2);
        assert_eq!(online_set_for(&out, 1), vec!["alice", "bob"]);
        assert_eq!(online_set_for(&out, 2), vec!["alice", "bob"]);
    }

    #[test]
    fn hello_with_empty_id_is_ignored() {
        let mut engine = RelayEngine::new();
        assert!(hello(&mut engine, 1, "").is_empty());
        assert!(engine.presence().is_empty());
    }

    #[test]
    fn call_request_is_forwarded_verbatim() {
        let mut engine = RelayEngine::new();
        hello(&mut engine, 1, "alice");
        hello(&mut engine, 2, "bob");

        let msg = call_request("alice", "bob");
        let out = engine.handle(1, msg.clone());
        assert_eq!(
            out,
            vec![OutgoingMsg {
                client_id_target: 2,
                msg
            }]
        );
    }

    #[test]
    fn candidate_and_end_are_forwarded_both_ways() {
        let mut engine = RelayEngine::new();
        hello(&mut engine, 1, "alice");
        hello(&mut engine, 2, "bob");

        let cand = SignalingMsg::AddressCandidate {
            from: "bob".into(),
            to: "alice".into(),
            payload: Payload::encode(&AddressCandidate::new("candidate:1 1 udp 1 10.0.0.2 5000 typ host"))
                .unwrap(),
        };
        let out = engine.handle(2, cand);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].client_id_target, 1);

        let out = engine.handle(1, SignalingMsg::call_ended("alice", "bob"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].client_id_target, 2);
        match &out[0].msg {
            SignalingMsg::CallEnded { from, to, .. } => {
                assert_eq!(from, "alice");
                assert_eq!(to, "bob");
            }
            other => panic!("expected CallEnded, got {:?}", other),
        }
    }

    #[test]
    fn message_to_absent_participant_is_silently_dropped() {
        let mut engine = RelayEngine::new();
        hello(&mut engine, 1, "alice");

        let out = engine.handle(1, call_request("alice", "nobody"));
        assert!(out.is_empty());
    }

    #[test]
    fn message_before_hello_is_dropped() {
        let mut engine = RelayEngine::new();
        hello(&mut engine, 2, "bob");

        let out = engine.handle(1, call_request("alice", "bob"));
        assert!(out.is_empty());
    }

    #[test]
    fn spoofed_from_is_dropped() {
        let mut engine = RelayEngine::new();
        hello(&mut engine, 1, "alice");
        hello(&mut engine, 2, "bob");
        hello(&mut engine, 3, "carol");

        let out = engine.handle(3, call_request("alice", "bob"));
        assert!(out.is_empty());
    }

    #[test]
    fn ping_gets_pong_to_sender_only() {
        let mut engine = RelayEngine::new();
        let out = engine.handle(7, SignalingMsg::Ping { nonce: 99 });
        assert_eq!(
            out,
            vec![OutgoingMsg {
                client_id_target: 7,
                msg: SignalingMsg::Pong { nonce: 99 }
            }]
        );
    }

    #[test]
    fn relay_only_messages_from_clients_are_ignored() {
        let mut engine = RelayEngine::new();
        hello(&mut engine, 1, "alice");
        let out = engine.handle(
            1,
            SignalingMsg::OnlineSet {
                participant_ids: vec!["x".into()],
            },
        );
        assert!(out.is_empty());
        assert!(engine.handle(1, SignalingMsg::Pong { nonce: 1 }).is_empty());
    }

    #[test]
    fn disconnect_broadcasts_set_without_departed_participant() {
        let mut engine = RelayEngine::new();
        hello(&mut engine, 1, "alice");
        hello(&mut engine, 2, "bob");

        let out = engine.handle_disconnect(1);
        assert_eq!(out.len(), 1);
        assert_eq!(online_set_for(&out, 2), vec!["bob"]);
    }

    #[test]
    fn disconnect_of_unregistered_client_is_quiet() {
        let mut engine = RelayEngine::new();
        hello(&mut engine, 1, "alice");
        assert!(engine.handle_disconnect(42).is_empty());
    }

    #[test]
    fn deregister_absent_participant_is_noop() {
        let mut engine = RelayEngine::new();
        hello(&mut engine, 1, "alice");
        assert!(engine.deregister("ghost").is_empty());
        assert_eq!(engine.presence().len(), 1);
    }

    #[test]
    fn deregister_removes_participant_from_every_later_broadcast() {
        let mut engine = RelayEngine::new();
        hello(&mut engine, 1, "alice");
        hello(&mut engine, 2, "bob");

        let out = engine.deregister("alice");
        assert_eq!(online_set_for(&out, 2), vec!["bob"]);

        let out = hello(&mut engine, 3, "carol");
        for o in &out {
            match &o.msg {
                SignalingMsg::OnlineSet { participant_ids } => {
                    assert!(!participant_ids.iter().any(|p| p == "alice"));
                }
                other => panic!("expected OnlineSet, got {:?}", other),
            }
        }
    }

    #[test]
    fn reconnect_routes_to_newest_connection() {
        let mut engine = RelayEngine::new();
        hello(&mut engine, 1, "alice");
        hello(&mut engine, 2, "bob");
        hello(&mut engine, 3, "bob");

        let out = engine.handle(1, call_request("alice", "bob"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].client_id_target, 3);

        // the stale connection going away must not take bob offline
        assert!(engine.handle_disconnect(2).is_empty());
        assert_eq!(engine.presence().lookup("bob"), Some(3));
    }
}
