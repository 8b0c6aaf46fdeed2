//! Default values for run settings.
//!
//! # Design
//! - Keep every default in one place so the CLI help text and docs stay consistent.

/// Seconds between state polls when nothing else is configured.
pub const POLL_INTERVAL_SECS: u64 = 30;
/// Tag written on each encrypted clone naming its source volume.
pub const PROVENANCE_TAG_KEY: &str = "reseal:source-volume";
/// Tag written on each source volume naming its encrypted replacement.
pub const REMEDIATION_TAG_KEY: &str = "reseal:encrypted-replacement";
/// Prefix for snapshot descriptions; the source volume id is appended.
pub const SNAPSHOT_DESCRIPTION: &str = "reseal pre-encryption snapshot";
