//! Parsers for the human-readable values used in `powerwatch.toml`.

use std::time::Duration;

use chrono::NaiveTime;

use crate::error::{ConfigError, ConfigResult};

/// Parse a duration string like "5s", "500ms", "2m", "1h".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let s = s.trim();
    let bad = || ConfigError::Duration(s.to_string());

    let (digits, scale) = if let Some(ms) = s.strip_suffix("ms") {
        return ms.parse::<u64>().map(Duration::from_millis).map_err(|_| bad());
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3600)
    } else {
        (s, 1)
    };
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(scale))
        .map(Duration::from_secs)
        .ok_or_else(bad)
}

/// Parse an `HH:MM` wall-clock time.
pub fn parse_clock(s: &str) -> ConfigResult<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").map_err(|_| ConfigError::Clock(s.to_string()))
}
