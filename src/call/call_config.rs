use std::time::Duration;

use crate::config::Config;

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// What to do with a `call-request` that arrives while a call is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    /// Drop it; the caller's dial timeout ends their attempt.
    #[default]
    Ignore,
    /// Answer at once with `call-ended`.
    HangUp,
}

impl BusyPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Some(BusyPolicy::Ignore),
            "hangup" | "hang-up" | "hang_up" => Some(BusyPolicy::HangUp),
            _ => None,
        }
    }
}

/// Configuration for call sessions (`[Call]` section).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallConfig {
    /// How long a `Dialing` session waits for `call-accepted`.
    pub dial_timeout: Duration,
    /// How long a `disconnected` transport may take to come back.
    pub disconnect_grace: Duration,
    pub busy_policy: BusyPolicy,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            disconnect_grace: DEFAULT_DISCONNECT_GRACE,
            busy_policy: BusyPolicy::default(),
        }
    }
}

impl CallConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dial_timeout: config.get_duration_ms_or("Call", "dial_timeout_ms", DEFAULT_DIAL_TIMEOUT),
            disconnect_grace: config.get_duration_ms_or(
                "Call",
                "disconnect_grace_ms",
                DEFAULT_DISCONNECT_GRACE,
            ),
            busy_policy: config
                .get_non_empty("Call", "busy_policy")
                .and_then(BusyPolicy::parse)
                .unwrap_or_default(),
        }
    }
}
