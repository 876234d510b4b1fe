use std::time::SystemTime;

/// Milliseconds since the UNIX epoch (0 if the clock is before it).
pub fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
