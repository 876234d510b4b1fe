use crate::{
    config::Config,
    log::{log_level::LogLevel, log_msg::LogMsg, logger_handle::LoggerHandle},
};

use std::{
    fs::{self, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, TrySendError},
    thread,
    time::{SystemTime, UNIX_EPOCH},
};

// -----------------------------------------------------------------------------
// COMPILE-TIME CONFIGURATION
// -----------------------------------------------------------------------------

/// Flush to disk every 100 lines if debugging/tracing (to see crashes near real-time).
#[cfg(feature = "log-debug")]
const FLUSH_BATCH_SIZE: u32 = 100;

/// Flush to disk every 1000 lines in production/default (to save I/O & CPU).
#[cfg(not(feature = "log-debug"))]
const FLUSH_BATCH_SIZE: u32 = 1_000;

/// Queue sizes used by the binaries.
pub const DEFAULT_LOG_CAP: usize = 1024;
pub const DEFAULT_UI_CAP: usize = 128;
pub const DEFAULT_SAMPLE_EVERY: u32 = 10;

// -----------------------------------------------------------------------------

/// Bounded, non-blocking logger that writes to a per-process log file.
///
/// A background worker consumes `LogMsg`s from a bounded channel and appends
/// them to the file. A second, sampled channel feeds a UI layer (call
/// notices panel, terminal status line) without flooding it: warnings and
/// errors are always forwarded, other levels one in `sample_every`.
pub struct Logger {
    handle: LoggerHandle,
    ui_log_rx: mpsc::Receiver<String>,
    thread: Option<thread::JoinHandle<()>>,
    file_path: PathBuf,
}

impl Logger {
    /// Logger for a call client, configured from the `[Logging]` section
    /// (`client_log_path`, `client_log_filename`, `min_level`).
    #[must_use]
    pub fn start_client(config: &Config) -> Self {
        Self::start("client_log_filename", "client_log_path", config)
    }

    /// Logger for the relay, configured from the `[Logging]` section
    /// (`server_log_path`, `server_log_filename`, `min_level`).
    #[must_use]
    pub fn start_server(config: &Config) -> Self {
        Self::start("server_log_filename", "server_log_path", config)
    }

    fn start(fn_key: &str, path_key: &str, config: &Config) -> Self {
        let app_name = config.get_non_empty("Logging", fn_key);
        let min_level = config
            .get_non_empty("Logging", "min_level")
            .and_then(LogLevel::parse)
            .unwrap_or(LogLevel::Info);

        let dir = match config.get_non_empty("Logging", path_key) {
            Some(dir_str) => expand_path(dir_str),
            None => exe_dir_fallback_cwd().join("logs"),
        };
        Self::start_in_dir(
            dir,
            app_name,
            DEFAULT_LOG_CAP,
            DEFAULT_UI_CAP,
            DEFAULT_SAMPLE_EVERY,
            min_level,
        )
    }

    /// Starts the logger in a specific directory.
    ///
    /// Creates the directory if missing, names the file
    /// `<app>-<YYYYMMDD_HHMMSS>-pid<N>.log` and spawns the worker thread.
    ///
    /// # Arguments
    ///
    /// * `cap` - Capacity of the main log channel (backpressure buffer).
    /// * `ui_cap` - Capacity of the UI sampling channel.
    /// * `sample_every` - Only 1 out of every N info/debug messages is sent to the UI.
    /// * `min_level` - Messages below this level are dropped at the handle.
    pub fn start_in_dir<D: AsRef<Path>>(
        dir: D,
        app_name: Option<&str>,
        cap: usize,
        ui_cap: usize,
        sample_every: u32,
        min_level: LogLevel,
    ) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let _ = fs::create_dir_all(&dir);

        // Avoid modulo-by-zero in the sampler.
        let sample_every = sample_every.max(1);

        let ts = timestamp_for_filename();
        let pid = std::process::id();
        let fname = match app_name {
            Some(name) => format!("{name}-{ts}-pid{pid}.log"),
            None => format!("peercall-{ts}-pid{pid}.log"),
        };
        let file_path = dir.join(fname);

        let (tx, rx) = mpsc::sync_channel::<LogMsg>(cap);
        let (ui_tx, ui_rx) = mpsc::sync_channel::<String>(ui_cap);

        let file_path_clone = file_path.clone();

        let thread = thread::Builder::new()
            .name("logger-worker".into())
            .spawn(move || {
                // Try target file -> temp file -> sink (never panic).
                let writer: Box<dyn Write + Send> = if let Ok(f) = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&file_path_clone)
                {
                    Box::new(f)
                } else {
                    let fallback = std::env::temp_dir().join("peercall-fallback.log");
                    match OpenOptions::new().create(true).append(true).open(&fallback) {
                        Ok(f) => Box::new(f),
                        Err(_) => Box::new(io::sink()),
                    }
                };

                let mut out = BufWriter::new(writer);
                let mut sampled: u32 = 0;
                let mut lines_written: u32 = 0;
                let mut dropped_to_ui: usize = 0;

                while let Ok(m) = rx.recv() {
                    let _ = writeln!(&mut out, "{}", m.render());
                    lines_written = lines_written.wrapping_add(1);

                    if lines_written % FLUSH_BATCH_SIZE == 0 {
                        let _ = out.flush();
                    }

                    let forward = matches!(m.level, LogLevel::Warn | LogLevel::Error) || {
                        sampled = sampled.wrapping_add(1);
                        sampled % sample_every == 0
                    };

                    if forward
                        && ui_tx
                            .try_send(format!("[{}] {}", m.level, m.text))
                            .is_err()
                    {
                        dropped_to_ui += 1;
                    }

                    if dropped_to_ui >= 10 {
                        let _ = ui_tx.try_send(format!(
                            "(logger) UI log queue dropped {dropped_to_ui} lines"
                        ));
                        dropped_to_ui = 0;
                    }
                }

                let _ = out.flush();
            })
            .ok();

        Self {
            handle: LoggerHandle { tx, min_level },
            ui_log_rx: ui_rx,
            thread,
            file_path,
        }
    }

    /// Attempts to enqueue a log message without blocking the current thread.
    ///
    /// If the channel is full, the message is **dropped** and an error is returned.
    pub fn try_log<S: Into<String>>(
        &self,
        level: LogLevel,
        text: S,
        target: &'static str,
    ) -> Result<(), TrySendError<LogMsg>> {
        self.handle.try_log(level, text, target)
    }

    /// Same as [`try_log`](Self::try_log) but ignores queue errors; used by the `logger_*` macros.
    pub fn log(&self, level: LogLevel, text: &str, target: &'static str) {
        let _ = self.handle.try_log(level, text, target);
    }

    /// Returns a cloneable handle to the logger sink.
    #[must_use]
    pub fn handle(&self) -> LoggerHandle {
        self.handle.clone()
    }

    /// Attempts to retrieve one sampled log line for UI display.
    #[must_use]
    pub fn try_recv_ui(&self) -> Option<String> {
        self.ui_log_rx.try_recv().ok()
    }

    /// Takes every sampled line queued so far.
    #[must_use]
    pub fn drain_ui(&self) -> Vec<String> {
        std::iter::from_fn(|| self.try_recv_ui()).collect()
    }

    /// Returns the path of the active log file.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Drops this logger's handle and waits for the worker to flush.
    ///
    /// The worker only exits once every cloned `LoggerHandle` is gone too.
    pub fn shutdown(mut self) {
        let thread = self.thread.take();
        drop(self);
        if let Some(t) = thread {
            let _ = t.join();
        }
    }
}

/// Directory of the running executable, or the current working directory on error.
fn exe_dir_fallback_cwd() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// `YYYYMMDD_HHMMSS` in UTC, computed without a date-time crate.
fn timestamp_for_filename() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let (year, mon, day) = civil_from_days(secs / 86_400);
    let rem = secs % 86_400;
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        year,
        mon,
        day,
        rem / 3_600,
        (rem % 3_600) / 60,
        rem % 60
    )
}

/// Days since 1970-01-01 to a Gregorian (year, month, day).
fn civil_from_days(days: u64) -> (i64, u64, u64) {
    let z = days as i64 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097); // [0, 146096]
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let day = (doy - (153 * mp + 2) / 5 + 1) as u64; // [1, 31]
    let mon = (if mp < 10 { mp + 3 } else { mp - 9 }) as u64; // [1, 12]
    let year = yoe + era * 400 + i64::from(mon <= 2);
    (year, mon, day)
}

/// Expands tilde (`~`) in file paths to the user's home directory.
fn expand_path(path_str: &str) -> PathBuf {
    let home = || {
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .ok()
            .map(PathBuf::from)
    };
    if path_str == "~" {
        if let Some(h) = home() {
            return h;
        }
    }
    if let Some(rest) = path_str
        .strip_prefix("~/")
        .or_else(|| path_str.strip_prefix("~\\"))
        && let Some(h) = home()
    {
        return h.join(rest);
    }
    PathBuf::from(path_str)
}
