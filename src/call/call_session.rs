use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Instant;

use crate::call::CallId;
use crate::call::call_config::CallConfig;
use crate::call::call_error::{CallError, EndReason};
use crate::call::call_event::{CallEvent, CallNotice, CallOutput};
use crate::call::call_state::{ConnectivityState, SessionState};
use crate::call::capabilities::{
    CallCapabilities, MediaStream, PeerConnection, PeerEvents,
};
use crate::log::LogSink;
use crate::signaling::protocol::{
    AddressCandidate, ParticipantId, Payload, SessionDescription, SignalingMsg,
};
use crate::{sink_debug, sink_info, sink_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeadlineKind {
    /// Caller waiting for `call-accepted`.
    Dial,
    /// Transport reported `disconnected`.
    Grace,
}

/// Per-call state machine for one participant.
///
/// Single writer: only the owning worker calls [`CallSession::handle`] and
/// [`CallSession::on_deadline`], one event at a time. Nothing here blocks or
/// sends; every side effect toward the relay or the UI comes back as a
/// [`CallOutput`].
pub struct CallSession {
    call_id: CallId,
    local_id: ParticipantId,
    peer_id: Option<ParticipantId>,
    state: SessionState,
    connectivity: ConnectivityState,

    caps: CallCapabilities,
    config: CallConfig,
    /// Cloned into each peer connection's [`PeerEvents`].
    events_tx: Sender<CallEvent>,

    local_stream: Option<Box<dyn MediaStream>>,
    remote_stream: Option<Box<dyn MediaStream>>,
    peer_connection: Option<Box<dyn PeerConnection>>,

    remote_description_set: bool,
    /// Remote candidates that arrived before the remote description.
    pending_candidates: VecDeque<AddressCandidate>,
    /// Callee: the offer, held until the user accepts.
    stored_offer: Option<SessionDescription>,
    /// Whether the peer knows this call exists (gates `call-ended`).
    peer_notified: bool,
    deadline: Option<(Instant, DeadlineKind)>,
    /// Initiation failed before anything was sent; state stays `Idle`.
    aborted: bool,
    end_reason: Option<EndReason>,

    log: Arc<dyn LogSink>,
}

impl CallSession {
    pub fn new(
        call_id: CallId,
        local_id: ParticipantId,
        caps: CallCapabilities,
        config: CallConfig,
        events_tx: Sender<CallEvent>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            call_id,
            local_id,
            peer_id: None,
            state: SessionState::Idle,
            connectivity: ConnectivityState::New,
            caps,
            config,
            events_tx,
            local_stream: None,
            remote_stream: None,
            peer_connection: None,
            remote_description_set: false,
            pending_candidates: VecDeque::new(),
            stored_offer: None,
            peer_notified: false,
            deadline: None,
            aborted: false,
            end_reason: None,
            log,
        }
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity
    }

    pub fn peer_id(&self) -> Option<&str> {
        self.peer_id.as_deref()
    }

    pub fn end_reason(&self) -> Option<&EndReason> {
        self.end_reason.as_ref()
    }

    pub fn remote_description_set(&self) -> bool {
        self.remote_description_set
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Ended, or aborted before it started. The worker stops here.
    pub fn is_finished(&self) -> bool {
        self.aborted || !self.state.is_live()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline.map(|(at, _)| at)
    }

    /// Process one event.
    pub fn handle(&mut self, event: CallEvent) -> Vec<CallOutput> {
        let mut out = Vec::new();

        if self.is_finished() {
            sink_debug!(
                self.log,
                "[call {:016x}] ignoring {} after end",
                self.call_id,
                event.name()
            );
            // A stream surfacing after teardown is released right away.
            if let CallEvent::RemoteStream(mut stream) = event {
                stream.stop();
            }
            return out;
        }

        match event {
            CallEvent::Initiate { peer } => self.on_initiate(peer, &mut out),
            CallEvent::Accept => self.on_accept(&mut out),
            CallEvent::Reject => match self.state {
                SessionState::Ringing => self.end(EndReason::Rejected, true, &mut out),
                other => {
                    sink_warn!(
                        self.log,
                        "[call {:016x}] reject ignored in state {}",
                        self.call_id,
                        other
                    );
                }
            },
            CallEvent::HangUp => {
                let reason = match self.state {
                    SessionState::Dialing => EndReason::Cancelled,
                    SessionState::Ringing => EndReason::Rejected,
                    _ => EndReason::LocalHangup,
                };
                self.end(reason, true, &mut out);
            }
            CallEvent::Inbound(msg) => self.on_inbound(msg, &mut out),
            CallEvent::LocalCandidate(candidate) => {
                if let Some(peer) = &self.peer_id {
                    match Payload::encode(&candidate) {
                        Ok(payload) => {
                            out.push(CallOutput::Signal(SignalingMsg::AddressCandidate {
                                from: self.local_id.clone(),
                                to: peer.clone(),
                                payload,
                            }));
                        }
                        Err(e) => {
                            sink_warn!(self.log, "[call {:016x}] local candidate: {}", self.call_id, e);
                        }
                    }
                }
            }
            CallEvent::Connectivity(state) => self.on_connectivity(state, &mut out),
            CallEvent::RemoteStream(stream) => {
                sink_debug!(
                    self.log,
                    "[call {:016x}] remote stream {}",
                    self.call_id,
                    stream.id()
                );
                if let Some(mut old) = self.remote_stream.replace(stream) {
                    old.stop();
                }
            }
            CallEvent::PeerOffline => {
                if matches!(self.state, SessionState::Dialing | SessionState::Ringing) {
                    let peer = self.peer_id.clone().unwrap_or_default();
                    self.end(
                        EndReason::Failed(CallError::PeerUnreachable(peer)),
                        false,
                        &mut out,
                    );
                }
            }
        }

        out
    }

    /// Fire the pending deadline if it is due at `now`.
    pub fn on_deadline(&mut self, now: Instant) -> Vec<CallOutput> {
        let mut out = Vec::new();
        let Some((at, kind)) = self.deadline else {
            return out;
        };
        if at > now || self.is_finished() {
            return out;
        }
        self.deadline = None;

        match kind {
            DeadlineKind::Dial => {
                sink_info!(self.log, "[call {:016x}] dial timeout", self.call_id);
                self.end(EndReason::Unanswered, true, &mut out);
            }
            DeadlineKind::Grace => {
                sink_info!(
                    self.log,
                    "[call {:016x}] transport did not recover",
                    self.call_id
                );
                self.end(
                    EndReason::Failed(CallError::NegotiationFailed(
                        "connectivity lost".into(),
                    )),
                    true,
                    &mut out,
                );
            }
        }
        out
    }

    // ---- Transitions ------------------------------------------------------

    fn on_initiate(&mut self, peer: ParticipantId, out: &mut Vec<CallOutput>) {
        if self.state != SessionState::Idle {
            out.push(CallOutput::Notice(CallNotice::Error(CallError::AlreadyInCall)));
            return;
        }
        self.peer_id = Some(peer.clone());

        if let Err(e) = self.acquire_local_media() {
            sink_warn!(self.log, "[call {:016x}] {}", self.call_id, e);
            self.aborted = true;
            self.end_reason = Some(EndReason::Failed(e.clone()));
            out.push(CallOutput::Notice(CallNotice::Error(e)));
            return;
        }

        match self.start_offer().and_then(|offer| Payload::encode(&offer).map_err(CallError::from)) {
            Ok(payload) => {
                out.push(CallOutput::Signal(SignalingMsg::CallRequest {
                    from: self.local_id.clone(),
                    to: peer,
                    payload,
                }));
                self.peer_notified = true;
                self.deadline = Some((Instant::now() + self.config.dial_timeout, DeadlineKind::Dial));
                self.set_state(SessionState::Dialing, out);
            }
            Err(e) => self.end(EndReason::Failed(e), true, out),
        }
    }

    fn on_accept(&mut self, out: &mut Vec<CallOutput>) {
        if self.state != SessionState::Ringing {
            sink_warn!(
                self.log,
                "[call {:016x}] accept ignored in state {}",
                self.call_id,
                self.state
            );
            return;
        }
        let Some(offer) = self.stored_offer.take() else {
            let e = CallError::NegotiationFailed("no offer to answer".into());
            self.end(EndReason::Failed(e), true, out);
            return;
        };

        match self
            .answer_offer(&offer)
            .and_then(|answer| Payload::encode(&answer).map_err(CallError::from))
        {
            Ok(payload) => {
                if let Some(peer) = &self.peer_id {
                    out.push(CallOutput::Signal(SignalingMsg::CallAccepted {
                        from: self.local_id.clone(),
                        to: peer.clone(),
                        payload,
                    }));
                }
                self.set_state(SessionState::Negotiating, out);
            }
            Err(e) => self.end(EndReason::Failed(e), true, out),
        }
    }

    fn on_inbound(&mut self, msg: SignalingMsg, out: &mut Vec<CallOutput>) {
        if let (Some(peer), Some((from, _))) = (&self.peer_id, msg.route())
            && from != peer
        {
            sink_warn!(
                self.log,
                "[call {:016x}] {} from {} is not for this call",
                self.call_id,
                msg.kind(),
                from
            );
            return;
        }

        match msg {
            SignalingMsg::CallRequest { from, payload, .. } => {
                if self.state != SessionState::Idle {
                    sink_debug!(self.log, "[call {:016x}] duplicate call-request", self.call_id);
                    return;
                }
                self.peer_id = Some(from);
                // the caller is already waiting on us
                self.peer_notified = true;

                let offer = match payload.decode::<SessionDescription>() {
                    Ok(offer) => offer,
                    Err(e) => {
                        let e = CallError::from(e);
                        out.push(CallOutput::Notice(CallNotice::Error(e.clone())));
                        self.end(EndReason::Failed(e), true, out);
                        return;
                    }
                };

                match self.acquire_local_media() {
                    Ok(()) => {
                        self.stored_offer = Some(offer);
                        self.set_state(SessionState::Ringing, out);
                    }
                    Err(e) => {
                        out.push(CallOutput::Notice(CallNotice::Error(e.clone())));
                        self.end(EndReason::Failed(e), true, out);
                    }
                }
            }

            SignalingMsg::CallAccepted { payload, .. } => {
                if self.state != SessionState::Dialing {
                    sink_debug!(
                        self.log,
                        "[call {:016x}] call-accepted ignored in state {}",
                        self.call_id,
                        self.state
                    );
                    return;
                }
                self.deadline = None;
                let applied = payload
                    .decode::<SessionDescription>()
                    .map_err(CallError::from)
                    .and_then(|answer| self.apply_remote_description(&answer));
                match applied {
                    Ok(()) => self.set_state(SessionState::Negotiating, out),
                    Err(e) => self.end(EndReason::Failed(e), true, out),
                }
            }

            SignalingMsg::AddressCandidate { payload, .. } => {
                match payload.decode::<AddressCandidate>() {
                    Ok(candidate) => self.on_remote_candidate(candidate),
                    Err(e) => {
                        sink_warn!(self.log, "[call {:016x}] dropping candidate: {}", self.call_id, e);
                    }
                }
            }

            SignalingMsg::CallEnded { .. } => self.end(EndReason::RemoteHangup, false, out),

            other => {
                sink_debug!(
                    self.log,
                    "[call {:016x}] ignoring {}",
                    self.call_id,
                    other.kind()
                );
            }
        }
    }

    fn on_remote_candidate(&mut self, candidate: AddressCandidate) {
        if !self.remote_description_set {
            self.pending_candidates.push_back(candidate);
            return;
        }
        if let Some(pc) = self.peer_connection.as_mut()
            && let Err(e) = pc.add_candidate(&candidate)
        {
            sink_warn!(self.log, "[call {:016x}] candidate rejected: {}", self.call_id, e);
        }
    }

    fn on_connectivity(&mut self, state: ConnectivityState, out: &mut Vec<CallOutput>) {
        if state == self.connectivity {
            return;
        }
        self.connectivity = state;
        out.push(CallOutput::Notice(CallNotice::ConnectivityChanged(state)));

        match state {
            ConnectivityState::Connected => {
                if matches!(self.deadline, Some((_, DeadlineKind::Grace))) {
                    sink_info!(self.log, "[call {:016x}] transport recovered", self.call_id);
                    self.deadline = None;
                }
                if self.state == SessionState::Negotiating {
                    self.set_state(SessionState::Connected, out);
                }
            }
            ConnectivityState::Disconnected => {
                if matches!(
                    self.state,
                    SessionState::Negotiating | SessionState::Connected
                ) && self.deadline.is_none()
                {
                    self.deadline = Some((
                        Instant::now() + self.config.disconnect_grace,
                        DeadlineKind::Grace,
                    ));
                    out.push(CallOutput::Notice(CallNotice::Error(
                        CallError::TransientDisconnect,
                    )));
                }
            }
            ConnectivityState::Failed => {
                let e = CallError::NegotiationFailed("transport failed".into());
                self.end(EndReason::Failed(e), true, out);
            }
            ConnectivityState::Closed => self.end(EndReason::TransportClosed, true, out),
            ConnectivityState::New | ConnectivityState::Connecting => {}
        }
    }

    /// Single exit: release everything exactly once and reach `Ended`.
    ///
    /// `notify_peer` is false when the peer already knows (their
    /// `call-ended`) or cannot be reached.
    fn end(&mut self, reason: EndReason, notify_peer: bool, out: &mut Vec<CallOutput>) {
        if !self.state.is_live() {
            return;
        }
        self.deadline = None;

        if let Some(mut pc) = self.peer_connection.take() {
            pc.close();
        }
        if let Some(mut stream) = self.local_stream.take() {
            stream.stop();
        }
        if let Some(mut stream) = self.remote_stream.take() {
            stream.stop();
        }
        self.pending_candidates.clear();
        self.stored_offer = None;

        if notify_peer
            && self.peer_notified
            && let Some(peer) = &self.peer_id
        {
            out.push(CallOutput::Signal(SignalingMsg::call_ended(
                self.local_id.clone(),
                peer.clone(),
            )));
        }

        sink_info!(self.log, "[call {:016x}] ended: {}", self.call_id, reason);
        self.end_reason = Some(reason.clone());
        self.set_state(SessionState::Ended, out);
        out.push(CallOutput::Notice(CallNotice::Ended { reason }));
    }

    // ---- Helpers ----------------------------------------------------------

    fn set_state(&mut self, next: SessionState, out: &mut Vec<CallOutput>) {
        if self.state == next {
            return;
        }
        sink_info!(
            self.log,
            "[call {:016x}] {} -> {}",
            self.call_id,
            self.state,
            next
        );
        self.state = next;
        out.push(CallOutput::Notice(CallNotice::StateChanged(next)));
    }

    /// Idempotent while a live stream is held.
    fn acquire_local_media(&mut self) -> Result<(), CallError> {
        if self.local_stream.is_none() {
            self.local_stream = Some(self.caps.media.acquire()?);
        }
        Ok(())
    }

    fn open_peer_connection(&mut self) -> Result<(), CallError> {
        if self.peer_connection.is_some() {
            return Ok(());
        }
        let mut pc = self
            .caps
            .peers
            .create(PeerEvents::new(self.events_tx.clone()))?;
        if let Some(stream) = self.local_stream.as_deref() {
            pc.add_local_stream(stream)?;
        }
        self.peer_connection = Some(pc);
        Ok(())
    }

    fn start_offer(&mut self) -> Result<SessionDescription, CallError> {
        self.open_peer_connection()?;
        let pc = self
            .peer_connection
            .as_mut()
            .ok_or(CallError::SessionClosed)?;
        let offer = pc.create_offer()?;
        pc.set_local_description(&offer)?;
        Ok(offer)
    }

    fn answer_offer(&mut self, offer: &SessionDescription) -> Result<SessionDescription, CallError> {
        self.open_peer_connection()?;
        self.apply_remote_description(offer)?;
        let pc = self
            .peer_connection
            .as_mut()
            .ok_or(CallError::SessionClosed)?;
        let answer = pc.create_answer()?;
        pc.set_local_description(&answer)?;
        Ok(answer)
    }

    /// Set the remote description, then hand over queued candidates in
    /// arrival order. Nothing else runs in between.
    fn apply_remote_description(&mut self, desc: &SessionDescription) -> Result<(), CallError> {
        let pc = self
            .peer_connection
            .as_mut()
            .ok_or(CallError::SessionClosed)?;
        pc.set_remote_description(desc)?;
        self.remote_description_set = true;

        while let Some(candidate) = self.pending_candidates.pop_front() {
            if let Err(e) = pc.add_candidate(&candidate) {
                sink_warn!(
                    self.log,
                    "[call {:016x}] queued candidate rejected: {}",
                    self.call_id,
                    e
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::call::loopback::{LoopbackMedia, LoopbackTally, loopback_capabilities};
    use crate::log::NoopLogSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;

    struct Harness {
        session: CallSession,
        rx: Receiver<CallEvent>,
        tally: Arc<LoopbackTally>,
    }

    impl Harness {
        fn new(local: &str) -> Self {
            let tally = LoopbackTally::new();
            let caps = loopback_capabilities(&tally);
            Self::with_caps(local, caps, tally)
        }

        fn with_caps(local: &str, caps: CallCapabilities, tally: Arc<LoopbackTally>) -> Self {
            let (tx, rx) = mpsc::channel();
            let session = CallSession::new(
                7,
                local.to_string(),
                caps,
                CallConfig::default(),
                tx,
                Arc::new(NoopLogSink),
            );
            Self { session, rx, tally }
        }

        /// Handle `ev`, then everything the peer connection queued meanwhile.
        fn handle(&mut self, ev: CallEvent) -> Vec<CallOutput> {
            let mut out = self.session.handle(ev);
            while let Ok(next) = self.rx.try_recv() {
                out.extend(self.session.handle(next));
            }
            out
        }

        fn connected_caller(&mut self) -> Vec<CallOutput> {
            let mut out = self.handle(CallEvent::Initiate { peer: "bob".into() });
            out.extend(self.handle(CallEvent::Inbound(SignalingMsg::CallAccepted {
                from: "bob".into(),
                to: "alice".into(),
                payload: Payload::encode(&SessionDescription::answer("v=0\r\n")).unwrap(),
            })));
            assert_eq!(self.session.state(), SessionState::Connected);
            out
        }
    }

    fn signals(out: &[CallOutput]) -> Vec<&SignalingMsg> {
        out.iter()
            .filter_map(|o| match o {
                CallOutput::Signal(m) => Some(m),
                CallOutput::Notice(_) => None,
            })
            .collect()
    }

    fn call_ended_count(out: &[CallOutput]) -> usize {
        signals(out)
            .iter()
            .filter(|m| matches!(m, SignalingMsg::CallEnded { .. }))
            .count()
    }

    fn ended_reasons(out: &[CallOutput]) -> Vec<EndReason> {
        out.iter()
            .filter_map(|o| match o {
                CallOutput::Notice(CallNotice::Ended { reason }) => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }

    fn inbound_request() -> CallEvent {
        CallEvent::Inbound(SignalingMsg::CallRequest {
            from: "alice".into(),
            to: "bob".into(),
            payload: Payload::encode(&SessionDescription::offer("v=0\r\n")).unwrap(),
        })
    }

    fn inbound_candidate(from: &str, to: &str, c: &str) -> CallEvent {
        CallEvent::Inbound(SignalingMsg::AddressCandidate {
            from: from.into(),
            to: to.into(),
            payload: Payload::encode(&AddressCandidate::new(c)).unwrap(),
        })
    }

    #[test]
    fn initiate_sends_call_request_and_dials() {
        let mut h = Harness::new("alice");
        let out = h.handle(CallEvent::Initiate { peer: "bob".into() });

        assert_eq!(h.session.state(), SessionState::Dialing);
        assert_eq!(h.tally.acquired(), 1);
        assert_eq!(h.tally.connections_created(), 1);
        assert!(h.session.next_deadline().is_some());

        let sent = signals(&out);
        match sent.first() {
            Some(SignalingMsg::CallRequest { from, to, payload }) => {
                assert_eq!(from, "alice");
                assert_eq!(to, "bob");
                assert!(payload.decode::<SessionDescription>().unwrap().sdp.starts_with("v=0"));
            }
            other => panic!("expected CallRequest first, got {:?}", other),
        }
        // the local host candidate trickles out right behind the offer
        match sent.get(1) {
            Some(SignalingMsg::AddressCandidate { to, .. }) => assert_eq!(to, "bob"),
            other => panic!("expected AddressCandidate, got {:?}", other),
        }
        assert!(out.contains(&CallOutput::Notice(CallNotice::StateChanged(
            SessionState::Dialing
        ))));
    }

    #[test]
    fn media_denial_on_initiate_aborts_in_idle() {
        let tally = LoopbackTally::new();
        let mut caps = loopback_capabilities(&tally);
        caps.media = Arc::new(LoopbackMedia::denied(tally.clone()));
        let mut h = Harness::with_caps("alice", caps, tally);

        let out = h.handle(CallEvent::Initiate { peer: "bob".into() });

        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(h.session.is_finished());
        assert!(signals(&out).is_empty());
        match out.as_slice() {
            [CallOutput::Notice(CallNotice::Error(CallError::MediaUnavailable(_)))] => {}
            other => panic!("expected a single MediaUnavailable notice, got {:?}", other),
        }
        assert_eq!(h.tally.connections_created(), 0);
    }

    #[test]
    fn callee_rings_then_accept_answers_and_connects() {
        let mut h = Harness::new("bob");
        let out = h.handle(inbound_request());
        assert_eq!(h.session.state(), SessionState::Ringing);
        assert_eq!(h.session.peer_id(), Some("alice"));
        assert!(signals(&out).is_empty());
        // media is captured while ringing; the connection waits for accept
        assert_eq!(h.tally.acquired(), 1);
        assert_eq!(h.tally.connections_created(), 0);

        let out = h.handle(CallEvent::Accept);
        match signals(&out).first() {
            Some(SignalingMsg::CallAccepted { from, to, payload }) => {
                assert_eq!(from, "bob");
                assert_eq!(to, "alice");
                assert_eq!(
                    payload.decode::<SessionDescription>().unwrap().kind,
                    crate::signaling::protocol::SdpKind::Answer
                );
            }
            other => panic!("expected CallAccepted, got {:?}", other),
        }
        assert_eq!(h.session.state(), SessionState::Connected);
        assert_eq!(h.session.connectivity(), ConnectivityState::Connected);
    }

    #[test]
    fn early_candidates_reach_callee_connection_in_order_after_accept() {
        let mut h = Harness::new("bob");
        h.handle(inbound_request());
        h.handle(inbound_candidate("alice", "bob", "C1"));
        h.handle(inbound_candidate("alice", "bob", "C2"));

        assert_eq!(h.session.pending_candidates(), 2);
        assert!(h.tally.applied_candidates().is_empty());

        h.handle(CallEvent::Accept);
        assert_eq!(h.tally.applied_candidates(), vec!["C1", "C2"]);
        assert_eq!(h.session.pending_candidates(), 0);

        h.handle(inbound_candidate("alice", "bob", "C3"));
        assert_eq!(h.tally.applied_candidates(), vec!["C1", "C2", "C3"]);
    }

    #[test]
    fn early_candidates_reach_caller_connection_after_answer() {
        let mut h = Harness::new("alice");
        h.handle(CallEvent::Initiate { peer: "bob".into() });
        h.handle(inbound_candidate("bob", "alice", "C1"));
        h.handle(inbound_candidate("bob", "alice", "C2"));
        assert!(!h.session.remote_description_set());
        assert!(h.tally.applied_candidates().is_empty());

        h.handle(CallEvent::Inbound(SignalingMsg::CallAccepted {
            from: "bob".into(),
            to: "alice".into(),
            payload: Payload::encode(&SessionDescription::answer("v=0\r\n")).unwrap(),
        }));
        assert!(h.session.remote_description_set());
        assert_eq!(h.tally.applied_candidates(), vec!["C1", "C2"]);
    }

    #[test]
    fn hang_up_twice_releases_once_and_sends_one_call_ended() {
        let mut h = Harness::new("alice");
        h.connected_caller();

        let first = h.handle(CallEvent::HangUp);
        let second = h.handle(CallEvent::HangUp);

        assert_eq!(h.session.state(), SessionState::Ended);
        assert_eq!(call_ended_count(&first), 1);
        assert!(second.is_empty());
        assert_eq!(ended_reasons(&first), vec![EndReason::LocalHangup]);
        assert_eq!(h.tally.stopped(), 1);
        assert_eq!(h.tally.connections_closed(), 1);
    }

    #[test]
    fn remote_call_ended_is_not_echoed() {
        let mut h = Harness::new("alice");
        h.connected_caller();

        let out = h.handle(CallEvent::Inbound(SignalingMsg::call_ended("bob", "alice")));
        assert_eq!(call_ended_count(&out), 0);
        assert_eq!(ended_reasons(&out), vec![EndReason::RemoteHangup]);
        assert_eq!(h.tally.stopped(), 1);
    }

    #[test]
    fn messages_from_someone_else_are_ignored() {
        let mut h = Harness::new("alice");
        h.connected_caller();

        let out = h.handle(CallEvent::Inbound(SignalingMsg::call_ended("mallory", "alice")));
        assert!(out.is_empty());
        assert_eq!(h.session.state(), SessionState::Connected);
    }

    #[test]
    fn dial_timeout_ends_unanswered_and_notifies_peer() {
        let mut h = Harness::new("alice");
        h.handle(CallEvent::Initiate { peer: "bob".into() });

        // not yet due
        assert!(h.session.on_deadline(Instant::now()).is_empty());

        let later = Instant::now() + Duration::from_secs(31);
        let out = h.session.on_deadline(later);
        assert_eq!(call_ended_count(&out), 1);
        assert_eq!(ended_reasons(&out), vec![EndReason::Unanswered]);
        assert_eq!(h.tally.stopped(), 1);
    }

    #[test]
    fn hang_up_while_dialing_cancels() {
        let mut h = Harness::new("alice");
        h.handle(CallEvent::Initiate { peer: "bob".into() });
        let out = h.handle(CallEvent::HangUp);
        assert_eq!(call_ended_count(&out), 1);
        assert_eq!(ended_reasons(&out), vec![EndReason::Cancelled]);
        assert_eq!(h.session.next_deadline(), None);
    }

    #[test]
    fn reject_while_ringing_sends_call_ended() {
        let mut h = Harness::new("bob");
        h.handle(inbound_request());
        let out = h.handle(CallEvent::Reject);
        match signals(&out).as_slice() {
            [SignalingMsg::CallEnded { from, to, .. }] => {
                assert_eq!(from, "bob");
                assert_eq!(to, "alice");
            }
            other => panic!("expected one CallEnded, got {:?}", other),
        }
        assert_eq!(ended_reasons(&out), vec![EndReason::Rejected]);
        assert_eq!(h.tally.stopped(), 1);
    }

    #[test]
    fn callee_media_denial_ends_and_tells_caller() {
        let tally = LoopbackTally::new();
        let mut caps = loopback_capabilities(&tally);
        caps.media = Arc::new(LoopbackMedia::denied(tally.clone()));
        let mut h = Harness::with_caps("bob", caps, tally);

        let out = h.handle(inbound_request());
        assert_eq!(h.session.state(), SessionState::Ended);
        assert_eq!(call_ended_count(&out), 1);
        assert!(out.iter().any(|o| matches!(
            o,
            CallOutput::Notice(CallNotice::Error(CallError::MediaUnavailable(_)))
        )));
    }

    #[test]
    fn disconnect_inside_grace_recovers() {
        let mut h = Harness::new("alice");
        h.connected_caller();

        let out = h.handle(CallEvent::Connectivity(ConnectivityState::Disconnected));
        assert!(out.contains(&CallOutput::Notice(CallNotice::Error(
            CallError::TransientDisconnect
        ))));
        assert!(h.session.next_deadline().is_some());

        h.handle(CallEvent::Connectivity(ConnectivityState::Connected));
        assert_eq!(h.session.next_deadline(), None);
        assert_eq!(h.session.state(), SessionState::Connected);
    }

    #[test]
    fn grace_expiry_escalates_to_negotiation_failure() {
        let mut h = Harness::new("alice");
        h.connected_caller();
        h.handle(CallEvent::Connectivity(ConnectivityState::Disconnected));

        let out = h.session.on_deadline(Instant::now() + Duration::from_secs(6));
        assert_eq!(call_ended_count(&out), 1);
        match ended_reasons(&out).as_slice() {
            [EndReason::Failed(CallError::NegotiationFailed(_))] => {}
            other => panic!("expected NegotiationFailed, got {:?}", other),
        }
    }

    #[test]
    fn transport_failure_ends_immediately() {
        let mut h = Harness::new("alice");
        h.connected_caller();
        let out = h.handle(CallEvent::Connectivity(ConnectivityState::Failed));
        assert_eq!(h.session.state(), SessionState::Ended);
        assert_eq!(call_ended_count(&out), 1);
        assert_eq!(h.tally.connections_closed(), 1);
    }

    #[test]
    fn transport_closed_ends_and_notifies_peer() {
        let mut h = Harness::new("alice");
        h.connected_caller();
        let out = h.handle(CallEvent::Connectivity(ConnectivityState::Closed));

        assert_eq!(h.session.state(), SessionState::Ended);
        assert_eq!(ended_reasons(&out), vec![EndReason::TransportClosed]);
        assert_eq!(call_ended_count(&out), 1);
        assert_eq!(h.tally.stopped(), 1);
        assert_eq!(h.tally.connections_closed(), 1);
    }

    #[test]
    fn offer_that_does_not_decode_ends_callee() {
        let mut h = Harness::new("bob");
        let pranswer: Payload = serde_json::from_str(r#"{"type":"pranswer","sdp":"x"}"#).unwrap();
        let out = h.handle(CallEvent::Inbound(SignalingMsg::CallRequest {
            from: "alice".into(),
            to: "bob".into(),
            payload: pranswer,
        }));

        assert_eq!(h.session.state(), SessionState::Ended);
        match ended_reasons(&out).as_slice() {
            [EndReason::Failed(CallError::NegotiationFailed(_))] => {}
            other => panic!("expected NegotiationFailed, got {:?}", other),
        }
        assert_eq!(call_ended_count(&out), 1);
        assert_eq!(h.tally.acquired(), 0);
    }

    #[test]
    fn candidate_that_does_not_decode_is_dropped() {
        let mut h = Harness::new("alice");
        h.connected_caller();
        let out = h.handle(CallEvent::Inbound(SignalingMsg::AddressCandidate {
            from: "bob".into(),
            to: "alice".into(),
            payload: Payload::null(),
        }));

        assert!(out.is_empty());
        assert_eq!(h.session.state(), SessionState::Connected);
    }

    #[test]
    fn peer_offline_while_dialing_is_unreachable() {
        let mut h = Harness::new("alice");
        h.handle(CallEvent::Initiate { peer: "bob".into() });
        let out = h.handle(CallEvent::PeerOffline);
        assert_eq!(call_ended_count(&out), 0);
        assert_eq!(
            ended_reasons(&out),
            vec![EndReason::Failed(CallError::PeerUnreachable("bob".into()))]
        );
    }

    #[test]
    fn peer_offline_during_established_call_is_ignored() {
        let mut h = Harness::new("alice");
        h.connected_caller();
        assert!(h.handle(CallEvent::PeerOffline).is_empty());
        assert_eq!(h.session.state(), SessionState::Connected);
    }

    #[derive(Debug)]
    struct CountingStream(Arc<AtomicUsize>);

    impl MediaStream for CountingStream {
        fn id(&self) -> &str {
            "counting"
        }
        fn stop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn remote_stream_after_end_is_stopped() {
        let mut h = Harness::new("alice");
        h.connected_caller();
        h.handle(CallEvent::HangUp);

        let stops = Arc::new(AtomicUsize::new(0));
        h.handle(CallEvent::RemoteStream(Box::new(CountingStream(stops.clone()))));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remote_stream_is_released_on_end() {
        let mut h = Harness::new("alice");
        h.connected_caller();

        let stops = Arc::new(AtomicUsize::new(0));
        h.handle(CallEvent::RemoteStream(Box::new(CountingStream(stops.clone()))));
        assert_eq!(stops.load(Ordering::SeqCst), 0);

        h.handle(CallEvent::HangUp);
        h.handle(CallEvent::HangUp);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
