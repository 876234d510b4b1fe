use std::collections::HashMap;
use std::sync::Arc;

use crate::log::{LogSink, NoopLogSink};
use crate::signaling::protocol::SignalingMsg;
use crate::signaling::relay_engine::RelayEngine;
use crate::signaling::types::{ClientId, OutgoingMsg};

/// Router glues the relay state machine to per-client outboxes.
pub struct Router {
    engine: RelayEngine,
    outboxes: HashMap<ClientId, Vec<SignalingMsg>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::with_log(Arc::new(NoopLogSink))
    }

    pub fn with_log(log: Arc<dyn LogSink>) -> Self {
        Self {
            engine: RelayEngine::with_log(log),
            outboxes: HashMap::new(),
        }
    }

    /// Register a new connection. It joins presence only after its hello.
    pub fn register_client(&mut self, client_id: ClientId) {
        self.outboxes.entry(client_id).or_default();
    }

    /// Unregister a client:
    /// - removes its outbox
    /// - lets the engine clean up presence and emit the new online set.
    pub fn unregister_client(&mut self, client_id: ClientId) {
        self.outboxes.remove(&client_id);

        let out_msgs = self.engine.handle_disconnect(client_id);
        for out_msg in out_msgs {
            self.enqueue(out_msg);
        }
    }

    /// Handle a message coming *from* a client and queue the results.
    pub fn handle_from_client(&mut self, from_cid: ClientId, msg: SignalingMsg) {
        let out_msgs = self.engine.handle(from_cid, msg);
        for out_msg in out_msgs {
            self.enqueue(out_msg);
        }
    }

    /// Drain and return all outgoing messages for a given client.
    pub fn take_outgoing_for(&mut self, client_id: ClientId) -> Vec<SignalingMsg> {
        self.outboxes
            .get_mut(&client_id)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Drain all pending outgoing messages for all clients.
    ///
    /// Each entry is (client_id_target, msg), ordered by client id.
    pub fn drain_all_outgoing(&mut self) -> Vec<(ClientId, SignalingMsg)> {
        let mut client_ids: Vec<ClientId> = self.outboxes.keys().copied().collect();
        client_ids.sort_unstable();

        let mut result = Vec::new();
        for cid in client_ids {
            for m in self.take_outgoing_for(cid) {
                result.push((cid, m));
            }
        }
        result
    }

    pub fn engine(&self) -> &RelayEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut RelayEngine {
        &mut self.engine
    }

    fn enqueue(&mut self, out_msg: OutgoingMsg) {
        // Clients that are already gone have no outbox; drop their mail.
        if let Some(queue) = self.outboxes.get_mut(&out_msg.client_id_target) {
            queue.push(out_msg.msg);
        }
    }
}
