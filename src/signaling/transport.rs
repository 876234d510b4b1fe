use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use crate::log::{LogSink, NoopLogSink};
use crate::signaling::protocol::{FrameBuffer, FrameError, MAX_BODY_LEN, SignalingMsg};
use crate::signaling::protocol::{decode_msg, write_msg as proto_write_msg};
use crate::signaling::server_event::ServerEvent;
use crate::signaling::types::ClientId;
use crate::{sink_debug, sink_info, sink_warn};

/// Read timeout set on every signaling socket; bounds outgoing latency.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

const READ_CHUNK: usize = 4096;

/// Items an I/O thread drains from its outgoing queue.
pub trait Outgoing {
    /// `None` asks the I/O thread to close the connection.
    fn into_msg(self) -> Option<SignalingMsg>;
}

impl Outgoing for SignalingMsg {
    fn into_msg(self) -> Option<SignalingMsg> {
        Some(self)
    }
}

/// Thin wrapper over a stream that speaks in `SignalingMsg`.
///
/// The stream is expected to have a read timeout (see [`POLL_INTERVAL`]);
/// a timeout surfaces as `Ok(None)` from [`Connection::poll_recv`].
///
/// A well-framed body that does not decode is logged and skipped; only a
/// broken header or the stream itself failing ends the connection.
pub struct Connection<S> {
    pub client_id: ClientId,
    stream: S,
    frames: FrameBuffer,
    log: Arc<dyn LogSink>,
}

impl<S> Connection<S>
where
    S: Read + Write,
{
    pub fn new(id: ClientId, stream: S) -> Self {
        Self::with_log(id, stream, Arc::new(NoopLogSink))
    }

    pub fn with_log(id: ClientId, stream: S, log: Arc<dyn LogSink>) -> Self {
        Self {
            client_id: id,
            stream,
            frames: FrameBuffer::new(MAX_BODY_LEN),
            log,
        }
    }

    /// Next message if one is buffered or arrives before the read timeout.
    pub fn poll_recv(&mut self) -> Result<Option<SignalingMsg>, FrameError> {
        if let Some(msg) = self.take_buffered()? {
            return Ok(Some(msg));
        }

        let mut chunk = [0u8; READ_CHUNK];
        match self.stream.read(&mut chunk) {
            Ok(0) => Err(FrameError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            ))),
            Ok(n) => {
                self.frames.extend(&chunk[..n]);
                self.take_buffered()
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(FrameError::Io(e)),
        }
    }

    pub fn send(&mut self, msg: &SignalingMsg) -> Result<(), FrameError> {
        proto_write_msg(&mut self.stream, msg)
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn take_buffered(&mut self) -> Result<Option<SignalingMsg>, FrameError> {
        while let Some((msg_type, body)) = self.frames.try_take()? {
            match decode_msg(msg_type, &body) {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => {
                    sink_warn!(
                        self.log,
                        "[conn {}] dropping undecodable {:?} frame: {}",
                        self.client_id,
                        msg_type,
                        e
                    );
                }
            }
        }
        Ok(None)
    }
}

/// Drive one connection until it closes.
///
/// Alternates between flushing everything queued in `outgoing` and polling
/// the socket for inbound messages, handing each to `on_msg`. Returns
/// `Ok(())` when the outgoing queue is closed, a close is requested, or
/// `on_msg` returns `false`; returns the error when the stream fails.
pub fn pump<S, T, F>(
    conn: &mut Connection<S>,
    outgoing: &Receiver<T>,
    mut on_msg: F,
) -> Result<(), FrameError>
where
    S: Read + Write,
    T: Outgoing,
    F: FnMut(SignalingMsg) -> bool,
{
    loop {
        loop {
            match outgoing.try_recv() {
                Ok(item) => match item.into_msg() {
                    Some(msg) => conn.send(&msg)?,
                    None => return Ok(()),
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }

        while let Some(msg) = conn.poll_recv()? {
            if !on_msg(msg) {
                return Ok(());
            }
        }
    }
}

/// Spawn the I/O thread for a single accepted client.
///
/// `stream` may be plain TCP or TLS; its socket must already carry a read
/// timeout. `server_tx` is the Sender<ServerEvent> that talks to the
/// central server loop.
pub fn spawn_connection_thread<S>(
    client_id: ClientId,
    stream: S,
    server_tx: Sender<ServerEvent>,
    log: Arc<dyn LogSink>,
) -> io::Result<()>
where
    S: Read + Write + Send + 'static,
{
    let (to_client_tx, to_client_rx) = mpsc::channel::<SignalingMsg>();

    server_tx
        .send(ServerEvent::RegisterClient {
            client_id,
            to_client: to_client_tx,
        })
        .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "server loop is gone"))?;

    thread::Builder::new()
        .name(format!("relay-conn-{client_id}"))
        .spawn(move || {
            let mut conn = Connection::with_log(client_id, stream, log.clone());
            let result = pump(&mut conn, &to_client_rx, |msg| {
                sink_debug!(log, "[conn {}] received {}", client_id, msg.kind());
                server_tx
                    .send(ServerEvent::MsgFromClient { client_id, msg })
                    .is_ok()
            });

            match result {
                Ok(()) => sink_info!(log, "[conn {}] closed", client_id),
                Err(FrameError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    sink_info!(log, "[conn {}] peer hung up", client_id)
                }
                Err(FrameError::Io(e)) => {
                    sink_warn!(
                        log,
                        "[conn {}] IO error: {} (kind={:?})",
                        client_id,
                        e,
                        e.kind()
                    )
                }
                Err(other) => sink_warn!(log, "[conn {}] frame error: {}", client_id, other),
            }

            let _ = server_tx.send(ServerEvent::Disconnected { client_id });
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use crate::signaling::protocol::{MsgType, write_frame, write_msg};
    use std::net::{TcpListener, TcpStream};

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_read_timeout(Some(POLL_INTERVAL)).unwrap();
        client.set_read_timeout(Some(POLL_INTERVAL)).unwrap();
        (server, client)
    }

    #[test]
    fn poll_recv_times_out_without_data() {
        let (server, _client) = socket_pair();
        let mut conn = Connection::new(1, server);
        assert!(conn.poll_recv().unwrap().is_none());
    }

    #[test]
    fn poll_recv_returns_each_buffered_message() {
        let (server, mut client) = socket_pair();
        write_msg(&mut client, &SignalingMsg::Ping { nonce: 1 }).unwrap();
        write_msg(&mut client, &SignalingMsg::Ping { nonce: 2 }).unwrap();

        let mut conn = Connection::new(1, server);
        let mut got = Vec::new();
        for _ in 0..40 {
            if let Some(msg) = conn.poll_recv().unwrap() {
                got.push(msg);
            }
            if got.len() == 2 {
                break;
            }
        }
        assert_eq!(
            got,
            vec![SignalingMsg::Ping { nonce: 1 }, SignalingMsg::Ping { nonce: 2 }]
        );
    }

    #[test]
    fn undecodable_body_is_skipped_not_fatal() {
        let (server, mut client) = socket_pair();
        write_frame(&mut client, MsgType::CallRequest, b"{not json").unwrap();
        // header says ping, body says pong
        write_frame(&mut client, MsgType::Ping, br#"{"type":"pong","nonce":1}"#).unwrap();
        write_msg(&mut client, &SignalingMsg::Ping { nonce: 2 }).unwrap();

        let mut conn = Connection::new(1, server);
        let mut got = None;
        for _ in 0..40 {
            got = conn.poll_recv().unwrap();
            if got.is_some() {
                break;
            }
        }
        assert_eq!(got, Some(SignalingMsg::Ping { nonce: 2 }));
    }

    #[test]
    fn poll_recv_reports_eof() {
        let (server, client) = socket_pair();
        drop(client);
        let mut conn = Connection::new(1, server);
        let mut result = conn.poll_recv();
        for _ in 0..40 {
            if !matches!(result, Ok(None)) {
                break;
            }
            result = conn.poll_recv();
        }
        match result {
            Err(FrameError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
    }

    #[test]
    fn connection_thread_registers_forwards_and_disconnects() {
        let (server, client) = socket_pair();
        let (server_tx, server_rx) = mpsc::channel::<ServerEvent>();

        spawn_connection_thread(7, server, server_tx, Arc::new(NoopLogSink)).unwrap();

        let to_client = match server_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            ServerEvent::RegisterClient {
                client_id,
                to_client,
            } => {
                assert_eq!(client_id, 7);
                to_client
            }
            _ => panic!("expected RegisterClient first"),
        };

        // inbound: socket -> MsgFromClient
        let mut client_conn = Connection::new(0, client);
        client_conn.send(&SignalingMsg::Ping { nonce: 5 }).unwrap();
        match server_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            ServerEvent::MsgFromClient { client_id, msg } => {
                assert_eq!(client_id, 7);
                assert_eq!(msg, SignalingMsg::Ping { nonce: 5 });
            }
            _ => panic!("expected MsgFromClient"),
        }

        // outbound: channel -> socket
        to_client.send(SignalingMsg::Pong { nonce: 5 }).unwrap();
        let mut reply = None;
        for _ in 0..40 {
            reply = client_conn.poll_recv().unwrap();
            if reply.is_some() {
                break;
            }
        }
        assert_eq!(reply, Some(SignalingMsg::Pong { nonce: 5 }));

        // closing the outgoing side ends the thread
        drop(to_client);
        match server_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            ServerEvent::Disconnected { client_id } => assert_eq!(client_id, 7),
            _ => panic!("expected Disconnected"),
        }
    }
}
