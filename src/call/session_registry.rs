use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::{RngCore, rngs::OsRng};

use crate::call::CallId;
use crate::call::call_config::{BusyPolicy, CallConfig};
use crate::call::call_error::CallError;
use crate::call::call_event::{CallEvent, CallUpdate};
use crate::call::call_session::CallSession;
use crate::call::call_worker::{WorkerContext, spawn_call_worker};
use crate::call::capabilities::CallCapabilities;
use crate::call::signal_sink::SignalSink;
use crate::log::LogSink;
use crate::signaling::protocol::{ParticipantId, SignalingMsg};
use crate::{sink_debug, sink_info, sink_warn};

/// The registry's view of the live session.
#[derive(Debug)]
pub struct ActiveCall {
    pub(crate) call_id: CallId,
    pub(crate) peer_id: ParticipantId,
    pub(crate) events_tx: Sender<CallEvent>,
}

impl ActiveCall {
    fn handle(&self) -> CallHandle {
        CallHandle {
            call_id: self.call_id,
            peer_id: self.peer_id.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

/// What the UI layer holds to act on a call.
///
/// Every action is queued to the session's worker; once the session has
/// ended they fail with [`CallError::SessionClosed`].
#[derive(Debug, Clone)]
pub struct CallHandle {
    call_id: CallId,
    peer_id: ParticipantId,
    events_tx: Sender<CallEvent>,
}

impl CallHandle {
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn accept(&self) -> Result<(), CallError> {
        self.post(CallEvent::Accept)
    }

    pub fn reject(&self) -> Result<(), CallError> {
        self.post(CallEvent::Reject)
    }

    pub fn hang_up(&self) -> Result<(), CallError> {
        self.post(CallEvent::HangUp)
    }

    pub fn post(&self, event: CallEvent) -> Result<(), CallError> {
        self.events_tx
            .send(event)
            .map_err(|_| CallError::SessionClosed)
    }
}

/// Result of offering an inbound `call-request` to the registry.
#[derive(Debug)]
pub enum IncomingOutcome {
    /// A new session is ringing.
    Ringing(CallHandle),
    /// Another call is live; handled per [`BusyPolicy`].
    Busy,
    /// Not a call-request for us, or a repeat from the current peer.
    Ignored,
}

/// Holds zero or one live call for the local participant.
pub struct SessionRegistry {
    local_id: ParticipantId,
    caps: CallCapabilities,
    config: CallConfig,
    signals: Arc<dyn SignalSink>,
    updates: Sender<CallUpdate>,
    slot: Arc<Mutex<Option<ActiveCall>>>,
    log: Arc<dyn LogSink>,
}

impl SessionRegistry {
    pub fn new(
        local_id: impl Into<ParticipantId>,
        caps: CallCapabilities,
        config: CallConfig,
        signals: Arc<dyn SignalSink>,
        updates: Sender<CallUpdate>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            caps,
            config,
            signals,
            updates,
            slot: Arc::new(Mutex::new(None)),
            log,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Start calling `peer`. Fails without side effects if a call is live.
    pub fn begin_outgoing(&self, peer: impl Into<ParticipantId>) -> Result<CallHandle, CallError> {
        let peer = peer.into();
        if peer == self.local_id {
            return Err(CallError::PeerUnreachable(peer));
        }

        let mut slot = self.lock_slot();
        if slot.is_some() {
            return Err(CallError::AlreadyInCall);
        }
        sink_info!(self.log, "calling {}", peer);
        self.start_session(&mut slot, peer.clone(), CallEvent::Initiate { peer })
    }

    /// Offer an inbound `call-request`. Never queues: a busy registry
    /// applies its busy policy and forgets the request.
    pub fn on_incoming(&self, request: SignalingMsg) -> IncomingOutcome {
        let from = match &request {
            SignalingMsg::CallRequest { from, to, .. } if *to == self.local_id => from.clone(),
            other => {
                sink_warn!(self.log, "on_incoming got {} not addressed to us", other.kind());
                return IncomingOutcome::Ignored;
            }
        };

        let mut slot = self.lock_slot();
        if let Some(active) = slot.as_ref() {
            if active.peer_id == from {
                // repeat from the same caller; the session sorts it out
                let _ = active.events_tx.send(CallEvent::Inbound(request));
                return IncomingOutcome::Ignored;
            }

            match self.config.busy_policy {
                BusyPolicy::Ignore => {
                    sink_info!(self.log, "busy: ignoring call from {}", from);
                }
                BusyPolicy::HangUp => {
                    sink_info!(self.log, "busy: declining call from {}", from);
                    let decline = SignalingMsg::call_ended(self.local_id.clone(), from);
                    if let Err(e) = self.signals.send_signal(decline) {
                        sink_warn!(self.log, "could not decline busy call: {}", e);
                    }
                }
            }
            return IncomingOutcome::Busy;
        }

        sink_info!(self.log, "incoming call from {}", from);
        match self.start_session(&mut slot, from, CallEvent::Inbound(request)) {
            Ok(handle) => IncomingOutcome::Ringing(handle),
            Err(e) => {
                sink_warn!(self.log, "could not start incoming session: {}", e);
                IncomingOutcome::Ignored
            }
        }
    }

    /// Deliver a routed message: requests go to [`Self::on_incoming`], the
    /// rest only to the live session whose peer sent them.
    pub fn route(&self, msg: SignalingMsg) {
        match &msg {
            SignalingMsg::CallRequest { .. } => {
                let _ = self.on_incoming(msg);
            }
            SignalingMsg::CallAccepted { from, .. }
            | SignalingMsg::AddressCandidate { from, .. }
            | SignalingMsg::CallEnded { from, .. } => {
                let slot = self.lock_slot();
                match slot.as_ref() {
                    Some(active) if active.peer_id == *from => {
                        let _ = active.events_tx.send(CallEvent::Inbound(msg));
                    }
                    _ => {
                        sink_debug!(self.log, "dropping {} from {} (no matching call)", msg.kind(), from);
                    }
                }
            }
            other => {
                sink_debug!(self.log, "registry ignores {}", other.kind());
            }
        }
    }

    /// Presence lost `participant`; the live session decides what that means.
    pub fn peer_offline(&self, participant: &str) {
        let slot = self.lock_slot();
        if let Some(active) = slot.as_ref()
            && active.peer_id == participant
        {
            let _ = active.events_tx.send(CallEvent::PeerOffline);
        }
    }

    pub fn current(&self) -> Option<CallHandle> {
        self.lock_slot().as_ref().map(ActiveCall::handle)
    }

    pub fn is_busy(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Hang up whatever is live (no-op when idle).
    pub fn hang_up_current(&self) {
        if let Some(active) = self.lock_slot().as_ref() {
            let _ = active.events_tx.send(CallEvent::HangUp);
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<ActiveCall>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the session and its worker while the slot is held, so a
    /// worker that finishes immediately cannot clear the slot before it is set.
    fn start_session(
        &self,
        slot: &mut MutexGuard<'_, Option<ActiveCall>>,
        peer_id: ParticipantId,
        first: CallEvent,
    ) -> Result<CallHandle, CallError> {
        let call_id: CallId = OsRng.next_u64();
        let (events_tx, events_rx) = mpsc::channel();

        let session = CallSession::new(
            call_id,
            self.local_id.clone(),
            self.caps.clone(),
            self.config,
            events_tx.clone(),
            self.log.clone(),
        );
        events_tx
            .send(first)
            .map_err(|_| CallError::SessionClosed)?;

        let ctx = WorkerContext {
            slot: self.slot.clone(),
            signals: self.signals.clone(),
            updates: self.updates.clone(),
            log: self.log.clone(),
        };
        spawn_call_worker(session, peer_id.clone(), events_rx, ctx).map_err(|e| {
            sink_warn!(self.log, "failed to spawn call worker: {}", e);
            CallError::SessionClosed
        })?;

        let active = ActiveCall {
            call_id,
            peer_id,
            events_tx,
        };
        let handle = active.handle();
        **slot = Some(active);
        Ok(handle)
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.hang_up_current();
    }
}
