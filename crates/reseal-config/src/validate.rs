//! Validation and parsing helpers for settings values.

use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Longest tag key accepted by the provider.
pub const MAX_TAG_KEY_LEN: usize = 128;

/// Parse a raw integer in seconds from an environment value.
///
/// # Errors
///
/// Returns `InvalidField` when the value is not an unsigned integer.
pub fn parse_u64(field: &'static str, raw: &str) -> ConfigResult<u64> {
    raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidField {
        field,
        reason: "not_an_integer",
        value: Some(raw.to_string()),
    })
}

/// Parse a raw attempt count from an environment value.
///
/// # Errors
///
/// Returns `InvalidField` when the value is not an unsigned 32-bit integer.
pub fn parse_u32(field: &'static str, raw: &str) -> ConfigResult<u32> {
    raw.trim().parse::<u32>().map_err(|_| ConfigError::InvalidField {
        field,
        reason: "not_an_integer",
        value: Some(raw.to_string()),
    })
}

/// Convert a poll interval in seconds into a duration; zero is rejected.
///
/// # Errors
///
/// Returns `InvalidField` when `secs` is zero.
pub fn validate_poll_interval(secs: u64) -> ConfigResult<Duration> {
    if secs == 0 {
        return Err(ConfigError::InvalidField {
            field: "poll_interval_secs",
            reason: "zero",
            value: Some(secs.to_string()),
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Ensure an attempt bound, when present, allows at least one poll.
///
/// # Errors
///
/// Returns `InvalidField` when `attempts` is zero.
pub fn validate_max_attempts(attempts: Option<u32>) -> ConfigResult<Option<u32>> {
    match attempts {
        Some(0) => Err(ConfigError::InvalidField {
            field: "max_poll_attempts",
            reason: "zero",
            value: Some("0".to_string()),
        }),
        other => Ok(other),
    }
}

/// Validate a tag key against the provider's naming rules.
///
/// # Errors
///
/// Returns `InvalidField` when the key is empty, too long, or uses the reserved `aws:` prefix.
pub fn validate_tag_key(field: &'static str, key: &str) -> ConfigResult<String> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidField {
            field,
            reason: "empty",
            value: None,
        });
    }
    if trimmed.chars().count() > MAX_TAG_KEY_LEN {
        return Err(ConfigError::InvalidField {
            field,
            reason: "too_long",
            value: Some(trimmed.to_string()),
        });
    }
    if trimmed.to_ascii_lowercase().starts_with("aws:") {
        return Err(ConfigError::InvalidField {
            field,
            reason: "reserved_prefix",
            value: Some(trimmed.to_string()),
        });
    }
    Ok(trimmed.to_string())
}
