use std::path::PathBuf;

use crate::config::Config;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// `[Signaling]` settings used by the relay.
///
/// TLS is enabled only when both `tls_cert_path` and `tls_key_path` are set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub tls: Option<RelayTlsPaths>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTlsPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            tls: None,
        }
    }
}

impl RelayConfig {
    pub fn plain(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            tls: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let bind_addr = config
            .get_non_empty_or_default("Signaling", "bind_addr", DEFAULT_BIND_ADDR)
            .to_string();

        let tls = match (
            config.get_non_empty("Signaling", "tls_cert_path"),
            config.get_non_empty("Signaling", "tls_key_path"),
        ) {
            (Some(cert), Some(key)) => Some(RelayTlsPaths {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            _ => None,
        };

        Self { bind_addr, tls }
    }
}
