//! Leveled logging macros for any `LogSink` (`sink_*`) and for the `Logger` itself (`logger_*`).
//!
//! # Feature Flags
//! Specific log levels are controlled by cargo features:
//! `log-trace`, `log-debug`, `log-info`, `log-warn`, `log-error`.
//!
//! If a feature is disabled, the corresponding macros expand to a dead branch:
//! arguments still type-check (so variables only logged at that level do not
//! go unused), but no formatting or allocation happens.

// ============================================================================
// 1. GENERIC INTERNAL MACROS
// ============================================================================

#[macro_export]
macro_rules! sink_log {
    ($sink:expr, $lvl:expr, $($arg:tt)*) => {{
        let __msg = format!($($arg)*);
        $sink.log($lvl, &__msg, module_path!());
    }};
}

#[macro_export]
macro_rules! logger_log {
    ($logger:expr, $lvl:expr, $($arg:tt)*) => {{
        let __msg = format!($($arg)*);
        $logger.log($lvl, &__msg, module_path!());
    }};
}

/// Expansion of a compiled-out level. Arguments are type-checked and count as
/// used, but nothing is evaluated.
#[doc(hidden)]
#[macro_export]
macro_rules! log_disabled {
    ($target:expr, $($arg:tt)*) => {{
        if false {
            let _ = &$target;
            let _ = ::std::format!($($arg)*);
        }
    }};
}

// ============================================================================
// 2. LEVEL-SPECIFIC MACROS (Feature Gated)
// ============================================================================

// ---------------------- TRACE ----------------------
#[cfg(feature = "log-trace")]
#[macro_export]
macro_rules! sink_trace   { ($sink:expr, $($arg:tt)*)   => { $crate::sink_log!($sink, $crate::log::log_level::LogLevel::Trace, $($arg)*) } }
#[cfg(feature = "log-trace")]
#[macro_export]
macro_rules! logger_trace { ($logger:expr, $($arg:tt)*) => { $crate::logger_log!($logger, $crate::log::log_level::LogLevel::Trace, $($arg)*) } }

#[cfg(not(feature = "log-trace"))]
#[macro_export]
macro_rules! sink_trace { ($sink:expr, $($arg:tt)*) => { $crate::log_disabled!($sink, $($arg)*) } }
#[cfg(not(feature = "log-trace"))]
#[macro_export]
macro_rules! logger_trace { ($logger:expr, $($arg:tt)*) => { $crate::log_disabled!($logger, $($arg)*) } }

// ---------------------- DEBUG ----------------------
#[cfg(feature = "log-debug")]
#[macro_export]
macro_rules! sink_debug   { ($sink:expr, $($arg:tt)*)   => { $crate::sink_log!($sink, $crate::log::log_level::LogLevel::Debug, $($arg)*) } }
#[cfg(feature = "log-debug")]
#[macro_export]
macro_rules! logger_debug { ($logger:expr, $($arg:tt)*) => { $crate::logger_log!($logger, $crate::log::log_level::LogLevel::Debug, $($arg)*) } }

#[cfg(not(feature = "log-debug"))]
#[macro_export]
macro_rules! sink_debug { ($sink:expr, $($arg:tt)*) => { $crate::log_disabled!($sink, $($arg)*) } }
#[cfg(not(feature = "log-debug"))]
#[macro_export]
macro_rules! logger_debug { ($logger:expr, $($arg:tt)*) => { $crate::log_disabled!($logger, $($arg)*) } }

// ---------------------- INFO ----------------------
#[cfg(feature = "log-info")]
#[macro_export]
macro_rules! sink_info   { ($sink:expr, $($arg:tt)*)   => { $crate::sink_log!($sink, $crate::log::log_level::LogLevel::Info, $($arg)*) } }
#[cfg(feature = "log-info")]
#[macro_export]
macro_rules! logger_info { ($logger:expr, $($arg:tt)*) => { $crate::logger_log!($logger, $crate::log::log_level::LogLevel::Info, $($arg)*) } }

#[cfg(not(feature = "log-info"))]
#[macro_export]
macro_rules! sink_info { ($sink:expr, $($arg:tt)*) => { $crate::log_disabled!($sink, $($arg)*) } }
#[cfg(not(feature = "log-info"))]
#[macro_export]
macro_rules! logger_info { ($logger:expr, $($arg:tt)*) => { $crate::log_disabled!($logger, $($arg)*) } }

// ---------------------- WARN ----------------------
#[cfg(feature = "log-warn")]
#[macro_export]
macro_rules! sink_warn   { ($sink:expr, $($arg:tt)*)   => { $crate::sink_log!($sink, $crate::log::log_level::LogLevel::Warn, $($arg)*) } }
#[cfg(feature = "log-warn")]
#[macro_export]
macro_rules! logger_warn { ($logger:expr, $($arg:tt)*) => { $crate::logger_log!($logger, $crate::log::log_level::LogLevel::Warn, $($arg)*) } }

#[cfg(not(feature = "log-warn"))]
#[macro_export]
macro_rules! sink_warn { ($sink:expr, $($arg:tt)*) => { $crate::log_disabled!($sink, $($arg)*) } }
#[cfg(not(feature = "log-warn"))]
#[macro_export]
macro_rules! logger_warn { ($logger:expr, $($arg:tt)*) => { $crate::log_disabled!($logger, $($arg)*) } }

// ---------------------- ERROR ----------------------
// Generally always enabled, but consistent structure allows user to disable if really needed.
#[cfg(feature = "log-error")]
#[macro_export]
macro_rules! sink_error   { ($sink:expr, $($arg:tt)*)   => { $crate::sink_log!($sink, $crate::log::log_level::LogLevel::Error, $($arg)*) } }
#[cfg(feature = "log-error")]
#[macro_export]
macro_rules! logger_error { ($logger:expr, $($arg:tt)*) => { $crate::logger_log!($logger, $crate::log::log_level::LogLevel::Error, $($arg)*) } }

#[cfg(not(feature = "log-error"))]
#[macro_export]
macro_rules! sink_error { ($sink:expr, $($arg:tt)*) => { $crate::log_disabled!($sink, $($arg)*) } }
#[cfg(not(feature = "log-error"))]
#[macro_export]
macro_rules! logger_error { ($logger:expr, $($arg:tt)*) => { $crate::log_disabled!($logger, $($arg)*) } }

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use crate::log::{LogLevel, LogSink};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<(LogLevel, String)>>);

    impl LogSink for Capture {
        fn log(&self, level: LogLevel, msg: &str, _target: &'static str) {
            self.0.lock().unwrap().push((level, msg.to_string()));
        }
    }

    #[cfg(feature = "log-warn")]
    #[test]
    fn enabled_level_formats_and_forwards() {
        let sink = Capture::default();
        let peer = "bob";
        sink_warn!(sink, "lost {} after {}ms", peer, 40);
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![(LogLevel::Warn, "lost bob after 40ms".to_string())]
        );
    }

    #[cfg(not(feature = "log-trace"))]
    #[test]
    fn disabled_level_evaluates_nothing() {
        let sink = Capture::default();
        let calls = std::cell::Cell::new(0);
        let expensive = || {
            calls.set(calls.get() + 1);
            "x"
        };
        sink_trace!(sink, "never {}", expensive());
        assert_eq!(calls.get(), 0);
        assert!(sink.0.lock().unwrap().is_empty());
    }
}
