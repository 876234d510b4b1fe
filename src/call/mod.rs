pub mod call_config;
pub mod call_error;
pub mod call_event;
pub mod call_session;
pub mod call_state;
pub mod call_worker;
pub mod capabilities;
pub mod loopback;
pub mod session_registry;
pub mod signal_sink;

/// Random per-call identifier, used in logs and [`CallUpdate`]s.
pub type CallId = u64;

pub use call_config::{BusyPolicy, CallConfig};
pub use call_error::{CallError, EndReason};
pub use call_event::{CallEvent, CallNotice, CallOutput, CallUpdate};
pub use call_session::CallSession;
pub use call_state::{ConnectivityState, SessionState};
pub use capabilities::{
    CallCapabilities, MediaSource, MediaStream, PeerConnection, PeerConnectionFactory, PeerEvents,
};
pub use session_registry::{CallHandle, IncomingOutcome, SessionRegistry};
pub use signal_sink::SignalSink;
