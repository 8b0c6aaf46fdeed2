//! Typed run settings and the override layer used to build them.

use std::time::Duration;

use serde::Serialize;

use crate::defaults;
use crate::error::ConfigResult;
use crate::validate::{validate_max_attempts, validate_poll_interval, validate_tag_key};

/// Effective, validated settings for one encryption run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSettings {
    /// Delay between state polls for every wait loop.
    pub poll_interval: Duration,
    /// Optional bound on polls per wait; `None` waits indefinitely.
    pub max_poll_attempts: Option<u32>,
    /// Tag key written on encrypted clones, value = source volume id.
    pub provenance_tag_key: String,
    /// Tag key written on source volumes, value = replacement volume id.
    pub remediation_tag_key: String,
    /// Snapshot description prefix.
    pub snapshot_description: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(defaults::POLL_INTERVAL_SECS),
            max_poll_attempts: None,
            provenance_tag_key: defaults::PROVENANCE_TAG_KEY.to_string(),
            remediation_tag_key: defaults::REMEDIATION_TAG_KEY.to_string(),
            snapshot_description: defaults::SNAPSHOT_DESCRIPTION.to_string(),
        }
    }
}

impl RunSettings {
    /// Build settings from overrides, filling gaps with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if any supplied value fails validation.
    pub fn from_overrides(overrides: &SettingsOverrides) -> ConfigResult<Self> {
        let poll_interval = validate_poll_interval(
            overrides
                .poll_interval_secs
                .unwrap_or(defaults::POLL_INTERVAL_SECS),
        )?;
        let max_poll_attempts = validate_max_attempts(overrides.max_poll_attempts)?;
        let provenance_tag_key = validate_tag_key(
            "provenance_tag_key",
            overrides
                .provenance_tag_key
                .as_deref()
                .unwrap_or(defaults::PROVENANCE_TAG_KEY),
        )?;
        let remediation_tag_key = validate_tag_key(
            "remediation_tag_key",
            overrides
                .remediation_tag_key
                .as_deref()
                .unwrap_or(defaults::REMEDIATION_TAG_KEY),
        )?;

        Ok(Self {
            poll_interval,
            max_poll_attempts,
            provenance_tag_key,
            remediation_tag_key,
            snapshot_description: defaults::SNAPSHOT_DESCRIPTION.to_string(),
        })
    }

    /// Description attached to the snapshot of `volume_id`.
    #[must_use]
    pub fn snapshot_description_for(&self, volume_id: &str) -> String {
        format!("{} of {volume_id}", self.snapshot_description)
    }
}

/// Partially specified settings from one source (flags or environment).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    /// Poll interval in seconds.
    pub poll_interval_secs: Option<u64>,
    /// Maximum polls per wait loop.
    pub max_poll_attempts: Option<u32>,
    /// Provenance tag key override.
    pub provenance_tag_key: Option<String>,
    /// Remediation tag key override.
    pub remediation_tag_key: Option<String>,
}

impl SettingsOverrides {
    /// Layer `higher` over `self`; values present in `higher` win.
    #[must_use]
    pub fn merged_with(self, higher: Self) -> Self {
        Self {
            poll_interval_secs: higher.poll_interval_secs.or(self.poll_interval_secs),
            max_poll_attempts: higher.max_poll_attempts.or(self.max_poll_attempts),
            provenance_tag_key: higher.provenance_tag_key.or(self.provenance_tag_key),
            remediation_tag_key: higher.remediation_tag_key.or(self.remediation_tag_key),
        }
    }
}
