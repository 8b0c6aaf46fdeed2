//! Split attached volumes into those that are already encrypted and those that need work.

use crate::model::{EncryptionTask, Partition, SkippedVolume, VolumeRecord};

/// Decision for one volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Leave the volume alone.
    Skip(String),
    /// Clone the volume into an encrypted replacement.
    NeedsEncryption,
}

/// Classify a single volume.
///
/// An unencrypted volume without a device name cannot be reattached, so it is
/// skipped rather than cloned. Missing metadata never fails classification.
#[must_use]
pub fn classify(volume: &VolumeRecord) -> Classification {
    if volume.encrypted {
        Classification::Skip("already encrypted".to_string())
    } else if volume.device_path.is_none() {
        Classification::Skip("no device path".to_string())
    } else {
        Classification::NeedsEncryption
    }
}

/// Partition volumes, preserving enumeration order on both sides.
#[must_use]
pub fn partition(volumes: Vec<VolumeRecord>) -> Partition {
    let mut result = Partition::default();
    for volume in volumes {
        match classify(&volume) {
            Classification::Skip(reason) => result.skipped.push(SkippedVolume {
                volume_id: volume.volume_id,
                reason,
            }),
            Classification::NeedsEncryption => result.tasks.push(EncryptionTask::new(volume)),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskPhase;

    fn volume(id: &str, encrypted: bool, device: Option<&str>) -> VolumeRecord {
        VolumeRecord {
            volume_id: id.to_string(),
            availability_zone: "us-east-1a".into(),
            volume_type: "io2".into(),
            device_path: device.map(str::to_string),
            delete_on_termination: None,
            encrypted,
            size_gib: Some(100),
            iops: Some(3000),
            throughput: None,
        }
    }

    #[test]
    fn encrypted_volumes_are_always_skipped() {
        assert_eq!(
            classify(&volume("vol-a", true, None)),
            Classification::Skip("already encrypted".into())
        );
        assert_eq!(
            classify(&volume("vol-b", false, Some("/dev/sdf"))),
            Classification::NeedsEncryption
        );
    }

    #[test]
    fn unencrypted_volume_without_device_is_skipped() {
        assert_eq!(
            classify(&volume("vol-c", false, None)),
            Classification::Skip("no device path".into())
        );
        let parts = partition(vec![
            volume("vol-c", false, None),
            volume("vol-d", false, Some("/dev/sdg")),
        ]);
        assert_eq!(parts.tasks.len(), 1);
        assert_eq!(parts.tasks[0].volume_id(), "vol-d");
        assert_eq!(parts.skipped[0].volume_id, "vol-c");
        assert_eq!(parts.skipped[0].reason, "no device path");
    }

    #[test]
    fn partition_keeps_enumeration_order() {
        let parts = partition(vec![
            volume("vol-1", false, Some("/dev/xvda")),
            volume("vol-2", true, Some("/dev/sdb")),
            volume("vol-3", false, Some("/dev/sdc")),
            volume("vol-4", true, None),
        ]);
        let task_ids: Vec<_> = parts.tasks.iter().map(EncryptionTask::volume_id).collect();
        let skipped_ids: Vec<_> = parts.skipped.iter().map(|s| s.volume_id.as_str()).collect();
        assert_eq!(task_ids, vec!["vol-1", "vol-3"]);
        assert_eq!(skipped_ids, vec!["vol-2", "vol-4"]);
        assert!(
            parts
                .tasks
                .iter()
                .all(|task| task.phase == TaskPhase::Pending && task.snapshot_id.is_none())
        );
    }
}
