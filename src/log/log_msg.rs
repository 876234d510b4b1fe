use crate::log::log_level::LogLevel;

/// Represents a single log message event.
///
/// This struct encapsulates the metadata associated with a log entry,
/// including its severity, timestamp, origin (target), and the message content itself.
#[derive(Debug, Clone)]
pub struct LogMsg {
    /// The severity level of the log (e.g., Info, Warning, Error).
    pub level: LogLevel,
    /// The timestamp of the log event in milliseconds.
    pub ts_ms: u128,
    /// The actual content or payload of the log message.
    pub text: String,
    /// The target source of the log, typically the static module path.
    pub target: &'static str, // module path
}

impl LogMsg {
    /// Creates a new `LogMsg` stamped with the current wall-clock time.
    pub fn now(level: LogLevel, text: impl Into<String>, target: &'static str) -> Self {
        Self {
            level,
            ts_ms: crate::utils::now_millis(),
            text: text.into(),
            target,
        }
    }

    /// One line as written to the log file.
    pub fn render(&self) -> String {
        format!("[{}] {} {} | {}", self.level, self.ts_ms, self.target, self.text)
    }
}
