use std::fmt;

/// Lifecycle of one call, as seen by one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    /// Caller: offer sent, waiting for the answer.
    Dialing,
    /// Callee: offer received, waiting for the local user.
    Ringing,
    /// Both descriptions exchanged, transport not yet up.
    Negotiating,
    Connected,
    Ended,
}

impl SessionState {
    pub fn is_live(self) -> bool {
        !matches!(self, SessionState::Ended)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Dialing => "dialing",
            SessionState::Ringing => "ringing",
            SessionState::Negotiating => "negotiating",
            SessionState::Connected => "connected",
            SessionState::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// Transport state reported by the peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectivityState::New => "new",
            ConnectivityState::Connecting => "connecting",
            ConnectivityState::Connected => "connected",
            ConnectivityState::Disconnected => "disconnected",
            ConnectivityState::Failed => "failed",
            ConnectivityState::Closed => "closed",
        };
        f.write_str(s)
    }
}
