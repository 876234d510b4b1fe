use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use crate::call::{
    CallCapabilities, CallConfig, CallError, CallHandle, CallUpdate, SessionRegistry,
};
use crate::client::AgentEvent;
use crate::log::LogSink;
use crate::signaling::protocol::{ParticipantId, SignalingMsg};
use crate::signaling::transport::POLL_INTERVAL;
use crate::signaling_client::{
    SignalingClient, SignalingClientConfig, SignalingClientError, SignalingEvent,
};
use crate::{sink_debug, sink_info, sink_warn};

/// One participant's calling endpoint.
///
/// Owns the relay connection and the [`SessionRegistry`], keeps the last
/// online set, and turns both into [`AgentEvent`]s through [`CallAgent::poll`].
/// All methods are non-blocking except `poll`.
pub struct CallAgent {
    // dropped first so a live call is hung up while the connection is still open
    registry: SessionRegistry,
    signaling: SignalingClient,
    updates_rx: Receiver<CallUpdate>,
    online: Vec<ParticipantId>,
    /// Whether any online set arrived yet.
    presence_known: bool,
    connected: bool,
    log: Arc<dyn LogSink>,
}

impl CallAgent {
    /// Wrap an already connected signaling client.
    pub fn new(
        signaling: SignalingClient,
        caps: CallCapabilities,
        config: CallConfig,
        log: Arc<dyn LogSink>,
    ) -> Self {
        let (updates_tx, updates_rx) = mpsc::channel();
        let registry = SessionRegistry::new(
            signaling.participant_id(),
            caps,
            config,
            Arc::new(signaling.sender()),
            updates_tx,
            log.clone(),
        );
        Self {
            registry,
            signaling,
            updates_rx,
            online: Vec::new(),
            presence_known: false,
            connected: true,
            log,
        }
    }

    pub fn connect(
        signaling_config: &SignalingClientConfig,
        call_config: CallConfig,
        participant_id: impl Into<ParticipantId>,
        caps: CallCapabilities,
        log: Arc<dyn LogSink>,
    ) -> Result<Self, SignalingClientError> {
        let signaling = SignalingClient::connect(signaling_config, participant_id, log.clone())?;
        Ok(Self::new(signaling, caps, call_config, log))
    }

    pub fn participant_id(&self) -> &str {
        self.signaling.participant_id()
    }

    /// Last online set seen, sorted.
    pub fn online(&self) -> &[ParticipantId] {
        &self.online
    }

    pub fn is_online(&self, participant: &str) -> bool {
        self.online.binary_search_by(|p| p.as_str().cmp(participant)).is_ok()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Call `peer`.
    ///
    /// Fails fast with [`CallError::PeerUnreachable`] when the relay has
    /// already told us the peer is offline. Before the first online set the
    /// call is attempted and the dial timeout decides.
    pub fn call(&self, peer: &str) -> Result<CallHandle, CallError> {
        if !self.connected {
            return Err(CallError::SessionClosed);
        }
        if self.presence_known && !self.is_online(peer) {
            sink_info!(self.log, "not calling {}: offline", peer);
            return Err(CallError::PeerUnreachable(peer.to_string()));
        }
        self.registry.begin_outgoing(peer)
    }

    pub fn current(&self) -> Option<CallHandle> {
        self.registry.current()
    }

    pub fn accept(&self) -> Result<(), CallError> {
        self.current_or_closed()?.accept()
    }

    pub fn reject(&self) -> Result<(), CallError> {
        self.current_or_closed()?.reject()
    }

    pub fn hang_up(&self) -> Result<(), CallError> {
        self.current_or_closed()?.hang_up()
    }

    /// Pump relay traffic and collect what happened, waiting up to `timeout`
    /// for the first event. Returns an empty vec on timeout.
    pub fn poll(&mut self, timeout: Duration) -> Vec<AgentEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = Vec::new();
        loop {
            while let Some(ev) = self.signaling.try_recv() {
                self.on_signaling(ev, &mut events);
            }
            while let Ok(update) = self.updates_rx.try_recv() {
                events.push(AgentEvent::Call(update));
            }
            if !events.is_empty() {
                return events;
            }

            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return events;
            }
            let step = left.min(POLL_INTERVAL);
            if self.connected {
                // wake on relay traffic; session updates are picked up next round
                if let Some(ev) = self.signaling.recv_timeout(step) {
                    self.on_signaling(ev, &mut events);
                }
            } else {
                // the event channel is closed and would return at once
                thread::sleep(step);
            }
        }
    }

    fn current_or_closed(&self) -> Result<CallHandle, CallError> {
        self.registry.current().ok_or(CallError::SessionClosed)
    }

    fn on_signaling(&mut self, event: SignalingEvent, events: &mut Vec<AgentEvent>) {
        match event {
            SignalingEvent::Message(SignalingMsg::OnlineSet { participant_ids }) => {
                let mut now = participant_ids;
                now.sort();
                now.dedup();

                for gone in self.online.iter().filter(|p| now.binary_search(*p).is_err()) {
                    sink_debug!(self.log, "{} went offline", gone);
                    self.registry.peer_offline(gone);
                }
                self.online = now.clone();
                self.presence_known = true;
                events.push(AgentEvent::Online(now));
            }
            SignalingEvent::Message(msg) => self.registry.route(msg),
            SignalingEvent::Disconnected { reason } => {
                if !self.connected {
                    return;
                }
                sink_warn!(self.log, "lost relay connection: {}", reason);
                self.connected = false;
                self.registry.hang_up_current();
                events.push(AgentEvent::Disconnected { reason });
            }
        }
    }
}
