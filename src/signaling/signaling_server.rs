use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, mpsc};
use std::{io, thread};

use rustls::{ServerConfig, ServerConnection, StreamOwned};

use crate::log::{LogSink, NoopLogSink};
use crate::signaling::relay_config::RelayConfig;
use crate::signaling::router::Router;
use crate::signaling::runtime::run_server_loop;
use crate::signaling::server_event::ServerEvent;
use crate::signaling::tls::build_server_config;
use crate::signaling::transport::{POLL_INTERVAL, spawn_connection_thread};
use crate::signaling::types::ClientId;
use crate::{sink_info, sink_warn};

/// Top-level runtime object for the relay.
///
/// This owns:
/// - the bound listener
/// - logging sink
/// - optional TLS config
/// and knows how to spin up the central Router loop plus per-connection threads.
pub struct SignalingServer {
    listener: TcpListener,
    log: Arc<dyn LogSink>,
    tls: Option<Arc<ServerConfig>>,
}

impl SignalingServer {
    /// Bind according to `config`, loading TLS material if configured.
    pub fn bind(config: &RelayConfig, log: Arc<dyn LogSink>) -> io::Result<Self> {
        let tls = match &config.tls {
            Some(paths) => Some(build_server_config(&paths.cert_path, &paths.key_path)?),
            None => None,
        };
        let listener = TcpListener::bind(&config.bind_addr)?;
        Ok(Self { listener, log, tls })
    }

    /// Plain TCP on `addr` without logging (tests bind `127.0.0.1:0`).
    pub fn bind_plain(addr: &str) -> io::Result<Self> {
        Self::bind(&RelayConfig::plain(addr), Arc::new(NoopLogSink))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Blocking main loop: spawn central server loop, accept clients.
    pub fn run(self) -> io::Result<()> {
        let Self { listener, log, tls } = self;

        // Events from all connections → central server loop
        let (server_tx, server_rx) = mpsc::channel::<ServerEvent>();

        {
            let log_for_loop = log.clone();
            let log_for_router = log.clone();

            thread::Builder::new()
                .name("relay-loop".into())
                .spawn(move || {
                    sink_info!(log_for_loop, "[signaling] server loop started");
                    let router = Router::with_log(log_for_router);
                    run_server_loop(router, log_for_loop, server_rx);
                })?;
        }

        let mut next_client_id: ClientId = 1;
        sink_info!(
            log,
            "signaling server listening on {} ({})",
            listener.local_addr()?,
            if tls.is_some() { "tls" } else { "plain tcp" }
        );

        for stream in listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    sink_warn!(
                        log,
                        "incoming TCP accept failed: {:?} (continuing to accept)",
                        e
                    );
                    continue;
                }
            };

            let client_id = next_client_id;
            next_client_id += 1;

            sink_info!(log, "accepted TCP connection as client_id={}", client_id);

            if let Err(e) = accept_client(client_id, stream, tls.as_ref(), &server_tx, &log) {
                sink_warn!(
                    log,
                    "failed to start connection for client {}: {:?}",
                    client_id,
                    e
                );
            }
        }

        Ok(())
    }
}

fn accept_client(
    client_id: ClientId,
    stream: TcpStream,
    tls: Option<&Arc<ServerConfig>>,
    server_tx: &mpsc::Sender<ServerEvent>,
    log: &Arc<dyn LogSink>,
) -> io::Result<()> {
    stream.set_read_timeout(Some(POLL_INTERVAL))?;
    stream.set_nodelay(true)?;

    match tls {
        Some(cfg) => {
            let conn = ServerConnection::new(cfg.clone())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let tls_stream = StreamOwned::new(conn, stream);
            spawn_connection_thread(client_id, tls_stream, server_tx.clone(), log.clone())
        }
        None => spawn_connection_thread(client_id, stream, server_tx.clone(), log.clone()),
    }
}
