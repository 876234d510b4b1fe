use crate::log::log_level::LogLevel;

/// Destination for log lines; shared as `Arc<dyn LogSink>` across threads.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, msg: &str, target: &'static str);
}
