//! Error types for settings validation.

use thiserror::Error;

/// Primary error type for settings operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Field that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
}

/// Convenience alias for settings results.
pub type ConfigResult<T> = Result<T, ConfigError>;
