use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConnection, StreamOwned};

use crate::log::{LogSink, NoopLogSink};
use crate::signaling::protocol::{FrameError, ParticipantId, SignalingMsg};
use crate::signaling::tls::build_client_config;
use crate::signaling::transport::{Connection, POLL_INTERVAL, pump};
use crate::signaling_client::signaling_client_config::SignalingClientConfig;
use crate::signaling_client::{SignalingClientError, SignalingCommand, SignalingEvent};
use crate::{sink_debug, sink_info, sink_warn};

/// Cloneable handle for pushing messages to the relay from any thread.
#[derive(Debug, Clone)]
pub struct SignalingSender {
    cmd_tx: Sender<SignalingCommand>,
}

impl SignalingSender {
    pub fn send(&self, msg: SignalingMsg) -> Result<(), SignalingClientError> {
        self.cmd_tx
            .send(SignalingCommand::Send(msg))
            .map_err(|_| SignalingClientError::Disconnected)
    }
}

/// Connection to the relay for one participant.
///
/// A network thread owns the stream. It announces the participant with
/// `hello`, forwards queued outgoing messages, and reports inbound traffic
/// as [`SignalingEvent`]s. `pong` replies to keepalive pings are consumed
/// there and never surface.
pub struct SignalingClient {
    participant_id: ParticipantId,
    sender: SignalingSender,
    events_rx: Receiver<SignalingEvent>,
    net_thread: Option<JoinHandle<()>>,
    log: Arc<dyn LogSink>,
}

impl SignalingClient {
    /// Connect using `[Signaling]` settings (TCP, or TLS when a CA is configured).
    pub fn connect(
        config: &SignalingClientConfig,
        participant_id: impl Into<ParticipantId>,
        log: Arc<dyn LogSink>,
    ) -> Result<Self, SignalingClientError> {
        let tcp = TcpStream::connect(&config.server_addr)?;
        tcp.set_read_timeout(Some(POLL_INTERVAL))?;
        tcp.set_nodelay(true)?;

        let client = match &config.tls {
            Some(tls) => {
                let tls_config = build_client_config(&tls.ca_path)?;
                let server_name = ServerName::try_from(tls.domain.clone())
                    .map_err(|_| SignalingClientError::InvalidServerName(tls.domain.clone()))?;
                let conn = ClientConnection::new(tls_config, server_name)?;
                Self::start(StreamOwned::new(conn, tcp), participant_id.into(), log)?
            }
            None => Self::start(tcp, participant_id.into(), log)?,
        };

        if let Some(every) = config.keepalive {
            client.spawn_keepalive(every)?;
        }
        sink_info!(
            client.log,
            "connected to relay {} as {}",
            config.server_addr,
            client.participant_id
        );
        Ok(client)
    }

    /// Plain TCP, no keepalive, no logging.
    pub fn connect_tcp(
        server_addr: &str,
        participant_id: impl Into<ParticipantId>,
    ) -> Result<Self, SignalingClientError> {
        Self::connect(
            &SignalingClientConfig::plain(server_addr),
            participant_id,
            Arc::new(NoopLogSink),
        )
    }

    /// Run the client over an already-established stream.
    ///
    /// The stream should time out reads after roughly [`POLL_INTERVAL`].
    pub fn start<S>(
        stream: S,
        participant_id: ParticipantId,
        log: Arc<dyn LogSink>,
    ) -> Result<Self, SignalingClientError>
    where
        S: Read + Write + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<SignalingCommand>();
        let (events_tx, events_rx) = mpsc::channel::<SignalingEvent>();

        // hello goes out before anything the caller queues
        cmd_tx
            .send(SignalingCommand::Send(SignalingMsg::Hello {
                participant_id: participant_id.clone(),
            }))
            .map_err(|_| SignalingClientError::Disconnected)?;

        let net_log = log.clone();
        let net_thread = thread::Builder::new()
            .name(format!("signaling-{participant_id}"))
            .spawn(move || network_loop(stream, cmd_rx, events_tx, net_log))?;

        Ok(Self {
            participant_id,
            sender: SignalingSender { cmd_tx },
            events_rx,
            net_thread: Some(net_thread),
            log,
        })
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    /// A cloneable sender sharing this connection.
    pub fn sender(&self) -> SignalingSender {
        self.sender.clone()
    }

    pub fn send(&self, msg: SignalingMsg) -> Result<(), SignalingClientError> {
        self.sender.send(msg)
    }

    /// Non-blocking poll for the next event.
    pub fn try_recv(&self) -> Option<SignalingEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `None` on timeout and once the network thread is gone and
    /// every event has been drained.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SignalingEvent> {
        match self.events_rx.recv_timeout(timeout) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Close the connection and wait for the network thread.
    pub fn disconnect(&mut self) {
        let _ = self.sender.cmd_tx.send(SignalingCommand::Disconnect);
        if let Some(t) = self.net_thread.take() {
            let _ = t.join();
        }
    }

    fn spawn_keepalive(&self, every: Duration) -> Result<(), SignalingClientError> {
        let sender = self.sender.clone();
        thread::Builder::new()
            .name("signaling-keepalive".into())
            .spawn(move || {
                let mut nonce: u64 = 0;
                loop {
                    thread::sleep(every);
                    nonce = nonce.wrapping_add(1);
                    if sender.send(SignalingMsg::Ping { nonce }).is_err() {
                        break;
                    }
                }
            })?;
        Ok(())
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn network_loop<S>(
    stream: S,
    cmd_rx: Receiver<SignalingCommand>,
    events_tx: Sender<SignalingEvent>,
    log: Arc<dyn LogSink>,
) where
    S: Read + Write,
{
    let mut conn = Connection::new(0, stream);

    let result = pump(&mut conn, &cmd_rx, |msg| match msg {
        SignalingMsg::Pong { nonce } => {
            sink_debug!(log, "keepalive pong {}", nonce);
            true
        }
        other => {
            sink_debug!(log, "received {}", other.kind());
            events_tx.send(SignalingEvent::Message(other)).is_ok()
        }
    });

    let reason = match result {
        Ok(()) => "closed".to_string(),
        Err(FrameError::Io(e)) => format!("connection lost: {e}"),
        Err(other) => {
            sink_warn!(log, "protocol error from relay: {}", other);
            format!("protocol error: {other}")
        }
    };
    sink_info!(log, "signaling connection ended ({})", reason);
    let _ = events_tx.send(SignalingEvent::Disconnected { reason });
}
