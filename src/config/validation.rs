//! Configuration validation helpers.

/// A realtime transport endpoint must be a WebSocket URL.
pub(super) fn validate_realtime_url(
    url: &Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(url) = url {
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(format!(
                "PARLEY_REALTIME_URL must start with ws:// or wss:// (got '{url}')"
            )
            .into());
        }
    }
    Ok(())
}

/// Guard timers and history bounds must be positive.
pub(super) fn validate_bounds(
    guard_auto_release_ms: u64,
    max_history_pairs: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if guard_auto_release_ms == 0 {
        return Err("PARLEY_GUARD_AUTO_RELEASE_MS must be greater than zero".into());
    }
    if max_history_pairs == 0 {
        return Err("PARLEY_MAX_HISTORY_PAIRS must be greater than zero".into());
    }
    Ok(())
}
