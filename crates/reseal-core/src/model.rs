//! Data carried through an encryption run.
//!
//! # Design
//! - `VolumeRecord` is read once and never mutated.
//! - `EncryptionTask` accumulates resource ids and its `phase` as the run progresses.
//! - Provider state strings are parsed into closed enums with an `Unknown` escape hatch.

use std::fmt;

use serde::Serialize;

use crate::journal::StepRecord;

/// One block device mapping entry on an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachedVolume {
    /// Volume identifier.
    pub volume_id: String,
    /// Device name from the mapping, when reported.
    pub device_path: Option<String>,
    /// Delete-on-termination flag from the mapping, when reported.
    pub delete_on_termination: Option<bool>,
}

/// Immutable description of a volume attached to the target instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeRecord {
    /// Volume identifier.
    pub volume_id: String,
    /// Availability zone the volume lives in.
    pub availability_zone: String,
    /// Volume type (`gp2`, `gp3`, `io1`, ...).
    pub volume_type: String,
    /// Device the volume is attached at.
    pub device_path: Option<String>,
    /// Delete-on-termination attribute of the attachment.
    pub delete_on_termination: Option<bool>,
    /// Whether the volume is already encrypted.
    pub encrypted: bool,
    /// Size in GiB.
    pub size_gib: Option<i32>,
    /// Provisioned IOPS.
    pub iops: Option<i32>,
    /// Provisioned throughput in MiB/s.
    pub throughput: Option<i32>,
}

/// Key/value pair written onto a cloud resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Build a tag from anything string-like.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Parameters for creating an encrypted volume from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    /// Snapshot the volume is restored from.
    pub snapshot_id: String,
    /// Zone of the source volume.
    pub availability_zone: String,
    /// Type of the source volume.
    pub volume_type: String,
    /// KMS key used for encryption.
    pub kms_key_id: String,
    /// Size carried over from the source.
    pub size_gib: Option<i32>,
    /// IOPS carried over from the source.
    pub iops: Option<i32>,
    /// Throughput carried over from the source.
    pub throughput: Option<i32>,
    /// Tags applied at creation time.
    pub tags: Vec<Tag>,
}

/// Lifecycle position of an encryption task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    /// Nothing created yet.
    Pending,
    /// Snapshot exists and completed.
    Snapshotted,
    /// Encrypted clone exists and is available.
    Cloned,
    /// Source volume detached from the instance.
    Detached,
    /// Clone attached and source tagged.
    Swapped,
    /// Intermediate snapshot deleted.
    Cleaned,
}

impl TaskPhase {
    /// Stable label used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Snapshotted => "snapshotted",
            Self::Cloned => "cloned",
            Self::Detached => "detached",
            Self::Swapped => "swapped",
            Self::Cleaned => "cleaned",
        }
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work item for one unencrypted source volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncryptionTask {
    /// Volume being replaced.
    pub source_volume: VolumeRecord,
    /// Intermediate snapshot, once created.
    pub snapshot_id: Option<String>,
    /// Encrypted replacement, once created.
    pub new_volume_id: Option<String>,
    /// Current lifecycle position.
    pub phase: TaskPhase,
}

impl EncryptionTask {
    /// Start a task for `source_volume`.
    #[must_use]
    pub const fn new(source_volume: VolumeRecord) -> Self {
        Self {
            source_volume,
            snapshot_id: None,
            new_volume_id: None,
            phase: TaskPhase::Pending,
        }
    }

    /// Identifier of the source volume.
    #[must_use]
    pub fn volume_id(&self) -> &str {
        &self.source_volume.volume_id
    }
}

/// Volume left untouched by the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedVolume {
    /// Volume identifier.
    pub volume_id: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Volumes split into those left alone and those needing work, in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Volumes that need no action.
    pub skipped: Vec<SkippedVolume>,
    /// Volumes that will be encrypted.
    pub tasks: Vec<EncryptionTask>,
}

/// Snapshot deletion that failed after a successful swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    /// Source volume the snapshot belonged to.
    pub volume_id: String,
    /// Snapshot that could not be removed.
    pub snapshot_id: String,
    /// Rendered provider error.
    pub message: String,
}

/// Caller inputs for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Instance whose volumes are encrypted.
    pub instance_id: String,
    /// KMS key used for every new volume.
    pub kms_key_id: String,
}

/// Facts established at the start of a run and threaded through every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunContext {
    /// Correlation id for logs and reports.
    pub run_id: String,
    /// Region the provider is bound to.
    pub region: String,
    /// Target instance.
    pub instance_id: String,
    /// KMS key for new volumes.
    #[serde(skip)]
    pub kms_key_id: String,
    /// Set after classification when at least one task exists.
    pub any_volume_needs_encryption: bool,
}

/// Result of a dry run: what would be done, with nothing mutated.
#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
    /// Run context after classification.
    pub context: RunContext,
    /// Volumes that would be left alone.
    pub skipped: Vec<SkippedVolume>,
    /// Volumes that would be encrypted.
    pub tasks: Vec<EncryptionTask>,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Run context after classification.
    pub context: RunContext,
    /// Volumes left alone.
    pub skipped: Vec<SkippedVolume>,
    /// Tasks with their final phase and resource ids.
    pub tasks: Vec<EncryptionTask>,
    /// Snapshot deletions that failed.
    pub cleanup_failures: Vec<CleanupFailure>,
    /// Whether the instance was stopped and started.
    pub instance_cycled: bool,
    /// Step journal.
    pub steps: Vec<StepRecord>,
}

/// Snapshot lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotState {
    /// Still copying.
    Pending,
    /// Ready to restore from.
    Completed,
    /// Failed permanently.
    Error,
    /// Anything else the provider reports.
    Unknown(String),
}

impl SnapshotState {
    /// Parse a provider state string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "completed" => Self::Completed,
            "error" => Self::Error,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Provider state string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Unknown(raw) => raw,
        }
    }
}

/// Volume lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeState {
    /// Being created.
    Creating,
    /// Not attached.
    Available,
    /// Attached to an instance.
    InUse,
    /// Being deleted.
    Deleting,
    /// Deleted.
    Deleted,
    /// Failed permanently.
    Error,
    /// Anything else the provider reports.
    Unknown(String),
}

impl VolumeState {
    /// Parse a provider state string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "creating" => Self::Creating,
            "available" => Self::Available,
            "in-use" => Self::InUse,
            "deleting" => Self::Deleting,
            "deleted" => Self::Deleted,
            "error" => Self::Error,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Provider state string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::InUse => "in-use",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Error => "error",
            Self::Unknown(raw) => raw,
        }
    }

    /// States a volume cannot leave on its own.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleting | Self::Deleted | Self::Error)
    }
}

/// Instance lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    /// Booting.
    Pending,
    /// Running.
    Running,
    /// Being terminated.
    ShuttingDown,
    /// Terminated.
    Terminated,
    /// Stopping.
    Stopping,
    /// Stopped.
    Stopped,
    /// Anything else the provider reports.
    Unknown(String),
}

impl InstanceState {
    /// Parse a provider state string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Provider state string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Unknown(raw) => raw,
        }
    }

    /// Instance is gone or going away.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_strings_round_trip_through_parse() {
        for raw in ["pending", "completed", "error"] {
            assert_eq!(SnapshotState::parse(raw).as_str(), raw);
        }
        for raw in ["creating", "available", "in-use", "deleted"] {
            assert_eq!(VolumeState::parse(raw).as_str(), raw);
        }
        assert_eq!(
            InstanceState::parse("rebooting"),
            InstanceState::Unknown("rebooting".into())
        );
    }

    #[test]
    fn terminal_states_are_flagged() {
        assert!(InstanceState::Terminated.is_terminal());
        assert!(InstanceState::ShuttingDown.is_terminal());
        assert!(!InstanceState::Stopping.is_terminal());
        assert!(VolumeState::Error.is_terminal());
        assert!(!VolumeState::Creating.is_terminal());
    }

    #[test]
    fn phases_are_ordered_by_progress() {
        assert!(TaskPhase::Pending < TaskPhase::Snapshotted);
        assert!(TaskPhase::Detached < TaskPhase::Swapped);
        assert!(TaskPhase::Swapped < TaskPhase::Cleaned);
        assert_eq!(TaskPhase::Detached.to_string(), "detached");
    }

    #[test]
    fn context_serialization_omits_key_id() -> Result<(), serde_json::Error> {
        let context = RunContext {
            run_id: "run-1".into(),
            region: "eu-west-1".into(),
            instance_id: "i-1".into(),
            kms_key_id: "alias/secret".into(),
            any_volume_needs_encryption: true,
        };
        let value = serde_json::to_value(&context)?;
        assert!(value.get("kms_key_id").is_none());
        assert_eq!(value["region"], "eu-west-1");
        Ok(())
    }
}
