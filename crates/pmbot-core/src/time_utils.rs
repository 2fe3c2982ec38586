/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Returns the current Unix timestamp in seconds.
pub fn current_unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Returns true when more than `window_ms` has passed since `since_unix_ms`.
///
/// A zero window never elapses.
pub fn window_elapsed(since_unix_ms: u64, window_ms: u64, now_unix_ms: u64) -> bool {
    if window_ms == 0 {
        return false;
    }
    now_unix_ms.saturating_sub(since_unix_ms) > window_ms
}
