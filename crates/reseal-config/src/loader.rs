//! Environment lookup for settings overrides.
//!
//! # Design
//! - Lookup goes through a closure so tests never touch the process environment.
//! - Empty values are treated as unset.

use tracing::debug;

use crate::error::ConfigResult;
use crate::model::SettingsOverrides;
use crate::validate::{parse_u32, parse_u64};

/// Poll interval in seconds.
pub const ENV_POLL_INTERVAL_SECS: &str = "RESEAL_POLL_INTERVAL_SECS";
/// Maximum polls per wait loop.
pub const ENV_MAX_POLL_ATTEMPTS: &str = "RESEAL_MAX_POLL_ATTEMPTS";
/// Provenance tag key.
pub const ENV_PROVENANCE_TAG: &str = "RESEAL_PROVENANCE_TAG";
/// Remediation tag key.
pub const ENV_REMEDIATION_TAG: &str = "RESEAL_REMEDIATION_TAG";

impl SettingsOverrides {
    /// Read overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
                .inspect(|raw| {
                    debug!(
                        variable = name,
                        value = %raw,
                        "settings override from environment"
                    );
                })
        };

        let poll_interval_secs = value(ENV_POLL_INTERVAL_SECS)
            .map(|raw| parse_u64("poll_interval_secs", &raw))
            .transpose()?;
        let max_poll_attempts = value(ENV_MAX_POLL_ATTEMPTS)
            .map(|raw| parse_u32("max_poll_attempts", &raw))
            .transpose()?;

        Ok(Self {
            poll_interval_secs,
            max_poll_attempts,
            provenance_tag_key: value(ENV_PROVENANCE_TAG),
            remediation_tag_key: value(ENV_REMEDIATION_TAG),
        })
    }
}
