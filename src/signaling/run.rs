use std::io;
use std::sync::Arc;

use crate::log::log_sink::LogSink;
use crate::signaling::relay_config::RelayConfig;
use crate::signaling::signaling_server::SignalingServer;

/// Run the relay described by `config` using the given log sink.
pub fn run_signaling_server_with_log(
    config: &RelayConfig,
    log_sink: Arc<dyn LogSink>,
) -> io::Result<()> {
    SignalingServer::bind(config, log_sink)?.run()
}

/// Convenience: plain TCP relay on `addr` with a `NoopLogSink` (no logging).
pub fn run_signaling_server(addr: &str) -> io::Result<()> {
    SignalingServer::bind_plain(addr)?.run()
}
