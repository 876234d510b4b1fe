//! In-memory media and peer connections.
//!
//! No devices, no sockets: a loopback peer connection reports one host
//! candidate after its local description is set, and turns `connected`
//! (handing over a remote stream) once both descriptions are in place.
//! A shared [`LoopbackTally`] counts what happened, for demos and tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::{Rng, RngCore, rngs::OsRng};

use crate::call::call_error::CallError;
use crate::call::call_state::ConnectivityState;
use crate::call::capabilities::{
    CallCapabilities, MediaSource, MediaStream, PeerConnection, PeerConnectionFactory, PeerEvents,
};
use crate::signaling::protocol::{AddressCandidate, SessionDescription};

const DEFAULT_PROTO: &str = "UDP/TLS/RTP/SAVPF";
const DEFAULT_FMT: &str = "99";
const DEFAULT_CODEC: &str = "VP8/90000";
const LOOPBACK_ADDR: &str = "127.0.0.1";

/// Counters shared by every loopback object created from one tally.
#[derive(Debug, Default)]
pub struct LoopbackTally {
    acquired: AtomicUsize,
    stopped: AtomicUsize,
    created: AtomicUsize,
    closed: AtomicUsize,
    applied: Mutex<Vec<String>>,
}

impl LoopbackTally {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Local streams handed out.
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Local streams stopped.
    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn connections_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn connections_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Remote candidates applied to any connection, in application order.
    pub fn applied_candidates(&self) -> Vec<String> {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_candidate(&self, candidate: &str) {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(candidate.to_string());
    }
}

/// Build both capabilities around one tally.
pub fn loopback_capabilities(tally: &Arc<LoopbackTally>) -> CallCapabilities {
    CallCapabilities {
        media: Arc::new(LoopbackMedia::new(tally.clone())),
        peers: Arc::new(LoopbackPeerFactory::new(tally.clone())),
    }
}

#[derive(Debug)]
pub struct LoopbackStream {
    id: String,
    /// Local streams report to the tally; remote ones do not.
    tally: Option<Arc<LoopbackTally>>,
    stopped: bool,
}

impl LoopbackStream {
    fn remote(id: String) -> Self {
        Self {
            id,
            tally: None,
            stopped: false,
        }
    }
}

impl MediaStream for LoopbackStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Some(tally) = &self.tally {
            tally.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Media source that always grants (or, when denied, always refuses) capture.
pub struct LoopbackMedia {
    tally: Arc<LoopbackTally>,
    deny: AtomicBool,
}

impl LoopbackMedia {
    pub fn new(tally: Arc<LoopbackTally>) -> Self {
        Self {
            tally,
            deny: AtomicBool::new(false),
        }
    }

    /// A source whose capture is refused, as if the user denied permission.
    pub fn denied(tally: Arc<LoopbackTally>) -> Self {
        let media = Self::new(tally);
        media.set_denied(true);
        media
    }

    pub fn set_denied(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }
}

impl MediaSource for LoopbackMedia {
    fn acquire(&self) -> Result<Box<dyn MediaStream>, CallError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(CallError::MediaUnavailable("capture permission denied".into()));
        }
        let n = self.tally.acquired.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(LoopbackStream {
            id: format!("local-{n}"),
            tally: Some(self.tally.clone()),
            stopped: false,
        }))
    }
}

pub struct LoopbackPeerFactory {
    tally: Arc<LoopbackTally>,
}

impl LoopbackPeerFactory {
    pub fn new(tally: Arc<LoopbackTally>) -> Self {
        Self { tally }
    }
}

impl PeerConnectionFactory for LoopbackPeerFactory {
    fn create(&self, events: PeerEvents) -> Result<Box<dyn PeerConnection>, CallError> {
        self.tally.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LoopbackPeer {
            events,
            tally: self.tally.clone(),
            session_id: OsRng.next_u64() >> 1,
            port: rand::thread_rng().gen_range(49_152..=65_535),
            local: None,
            remote: None,
            has_local_stream: false,
            connected: false,
            closed: false,
        }))
    }
}

pub struct LoopbackPeer {
    events: PeerEvents,
    tally: Arc<LoopbackTally>,
    session_id: u64,
    port: u16,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    has_local_stream: bool,
    connected: bool,
    closed: bool,
}

impl LoopbackPeer {
    fn sdp(&self) -> String {
        let direction = if self.has_local_stream {
            "sendrecv"
        } else {
            "recvonly"
        };
        format!(
            "v=0\r\no=- {sid} 1 IN IP4 {addr}\r\ns=-\r\nt=0 0\r\n\
             m=video {port} {DEFAULT_PROTO} {DEFAULT_FMT}\r\n\
             c=IN IP4 {addr}\r\na=rtpmap:{DEFAULT_FMT} {DEFAULT_CODEC}\r\na={direction}\r\n",
            sid = self.session_id,
            addr = LOOPBACK_ADDR,
            port = self.port,
        )
    }

    fn ensure_open(&self) -> Result<(), CallError> {
        if self.closed {
            return Err(CallError::NegotiationFailed("peer connection closed".into()));
        }
        Ok(())
    }

    fn maybe_connect(&mut self) {
        if self.connected || self.local.is_none() || self.remote.is_none() {
            return;
        }
        self.connected = true;
        self.events.connectivity(ConnectivityState::Connecting);
        self.events.remote_stream(Box::new(LoopbackStream::remote(format!(
            "remote-{}",
            self.session_id
        ))));
        self.events.connectivity(ConnectivityState::Connected);
    }
}

impl PeerConnection for LoopbackPeer {
    fn add_local_stream(&mut self, _stream: &dyn MediaStream) -> Result<(), CallError> {
        self.ensure_open()?;
        self.has_local_stream = true;
        Ok(())
    }

    fn create_offer(&mut self) -> Result<SessionDescription, CallError> {
        self.ensure_open()?;
        Ok(SessionDescription::offer(self.sdp()))
    }

    fn create_answer(&mut self) -> Result<SessionDescription, CallError> {
        self.ensure_open()?;
        if self.remote.is_none() {
            return Err(CallError::NegotiationFailed(
                "answer requested before remote offer".into(),
            ));
        }
        Ok(SessionDescription::answer(self.sdp()))
    }

    fn set_local_description(&mut self, desc: &SessionDescription) -> Result<(), CallError> {
        self.ensure_open()?;
        self.local = Some(desc.clone());

        let mut candidate = AddressCandidate::new(format!(
            "candidate:1 1 udp 2130706431 {LOOPBACK_ADDR} {} typ host",
            self.port
        ));
        candidate.sdp_mid = Some("0".into());
        candidate.sdp_mline_index = Some(0);
        self.events.local_candidate(candidate);

        self.maybe_connect();
        Ok(())
    }

    fn set_remote_description(&mut self, desc: &SessionDescription) -> Result<(), CallError> {
        self.ensure_open()?;
        if !desc.sdp.starts_with("v=0") {
            return Err(CallError::NegotiationFailed(
                "remote description is not SDP".into(),
            ));
        }
        self.remote = Some(desc.clone());
        self.maybe_connect();
        Ok(())
    }

    fn add_candidate(&mut self, candidate: &AddressCandidate) -> Result<(), CallError> {
        self.ensure_open()?;
        if self.remote.is_none() {
            return Err(CallError::NegotiationFailed(
                "candidate before remote description".into(),
            ));
        }
        self.tally.record_candidate(&candidate.candidate);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.tally.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
