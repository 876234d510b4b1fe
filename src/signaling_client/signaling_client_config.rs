use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;

pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:5000";

/// `[Signaling]` settings used by a call client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingClientConfig {
    pub server_addr: String,
    /// TLS is used only when a CA file is configured.
    pub tls: Option<ClientTls>,
    /// Ping interval; `None` (or `keepalive_ms = 0`) disables keepalive.
    pub keepalive: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTls {
    pub ca_path: PathBuf,
    /// Name checked against the relay certificate.
    pub domain: String,
}

impl Default for SignalingClientConfig {
    fn default() -> Self {
        Self::plain(DEFAULT_SERVER_ADDR)
    }
}

impl SignalingClientConfig {
    pub fn plain(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            tls: None,
            keepalive: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let server_addr = config
            .get_non_empty_or_default("Signaling", "server_addr", DEFAULT_SERVER_ADDR)
            .to_string();

        let tls = config
            .get_non_empty("Signaling", "tls_ca_path")
            .map(|ca| ClientTls {
                ca_path: PathBuf::from(ca),
                domain: config
                    .get_non_empty("Signaling", "tls_domain")
                    .map(str::to_string)
                    .unwrap_or_else(|| host_of(&server_addr).to_string()),
            });

        let keepalive = match config.get_u64_or("Signaling", "keepalive_ms", 0) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Self {
            server_addr,
            tls,
            keepalive,
        }
    }
}

/// `"host:port"` -> `"host"`; bracketed IPv6 keeps its brackets stripped.
fn host_of(addr: &str) -> &str {
    let host = addr.rsplit_once(':').map_or(addr, |(h, _)| h);
    host.trim_start_matches('[').trim_end_matches(']')
}
