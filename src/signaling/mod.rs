pub mod presence;
pub mod protocol;
pub mod relay_config;
pub mod relay_engine;
pub mod router;
pub mod run;
pub mod runtime;
pub mod server_event;
pub mod signaling_server;
pub mod tls;
pub mod transport;
pub mod types;

pub use presence::PresenceDirectory;
pub use relay_config::RelayConfig;
pub use relay_engine::RelayEngine;
pub use signaling_server::SignalingServer;
