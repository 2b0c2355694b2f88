//! Duration parsing utilities.

use crate::error::ConfigError;
use std::time::Duration;

/// Parse a duration string like "1h", "30m", "300s", "250ms" or "300".
///
/// Supports:
/// - Plain numbers (interpreted as seconds): "300"
/// - Milliseconds suffix: "250ms"
/// - Seconds suffix: "300s"
/// - Minutes suffix: "30m"
/// - Hours suffix: "1h"
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ConfigError::invalid("duration", s, "empty duration string"));
    }

    let parse = |num_str: &str, unit: &str, scale: u64| -> Result<u64, ConfigError> {
        let value = num_str.trim().parse::<u64>().map_err(|e| {
            ConfigError::invalid("duration", s, format!("invalid {unit} value: {e}"))
        })?;
        value
            .checked_mul(scale)
            .ok_or_else(|| ConfigError::invalid("duration", s, format!("too many {unit}")))
    };

    // "ms" must be checked before "m" and "s"
    if let Some(num_str) = s.strip_suffix("ms") {
        return Ok(Duration::from_millis(parse(num_str, "milliseconds", 1)?));
    }
    if let Some(num_str) = s.strip_suffix('h') {
        return Ok(Duration::from_secs(parse(num_str, "hours", 3600)?));
    }
    if let Some(num_str) = s.strip_suffix('m') {
        return Ok(Duration::from_secs(parse(num_str, "minutes", 60)?));
    }
    if let Some(num_str) = s.strip_suffix('s') {
        return Ok(Duration::from_secs(parse(num_str, "seconds", 1)?));
    }

    // No suffix - treat as seconds
    Ok(Duration::from_secs(parse(s, "seconds", 1)?))
}
