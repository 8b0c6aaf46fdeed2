//! Conversions between EC2 shapes and core models.

use aws_sdk_ec2::types::{Instance, Tag as Ec2Tag, Volume, VolumeType};
use reseal_core::{AttachedVolume, ProviderResult, Tag, VolumeRecord};

use crate::error::missing;

pub(crate) fn attached_volumes(instance: &Instance) -> Vec<AttachedVolume> {
    instance
        .block_device_mappings()
        .iter()
        .filter_map(|mapping| {
            let ebs = mapping.ebs()?;
            Some(AttachedVolume {
                volume_id: ebs.volume_id()?.to_string(),
                device_path: mapping.device_name().map(str::to_string),
                delete_on_termination: ebs.delete_on_termination(),
            })
        })
        .collect()
}

pub(crate) fn volume_record(volume: &Volume) -> ProviderResult<VolumeRecord> {
    let volume_id = volume
        .volume_id()
        .ok_or_else(|| missing("describe_volume", "volume_id"))?;
    let availability_zone = volume
        .availability_zone()
        .ok_or_else(|| missing("describe_volume", "availability_zone"))?;
    let volume_type = volume
        .volume_type()
        .ok_or_else(|| missing("describe_volume", "volume_type"))?;
    let attachment = volume.attachments().first();

    Ok(VolumeRecord {
        volume_id: volume_id.to_string(),
        availability_zone: availability_zone.to_string(),
        volume_type: volume_type.as_str().to_string(),
        device_path: attachment
            .and_then(|attachment| attachment.device())
            .map(str::to_string),
        delete_on_termination: attachment
            .and_then(|attachment| attachment.delete_on_termination()),
        encrypted: volume.encrypted().unwrap_or(false),
        size_gib: volume.size(),
        iops: volume.iops(),
        throughput: volume.throughput(),
    })
}

/// IOPS can only be provisioned on `io1`, `io2` and `gp3`; throughput only on `gp3`.
pub(crate) fn provisioned_performance(
    volume_type: &VolumeType,
    iops: Option<i32>,
    throughput: Option<i32>,
) -> (Option<i32>, Option<i32>) {
    match volume_type {
        VolumeType::Gp3 => (iops, throughput),
        VolumeType::Io1 | VolumeType::Io2 => (iops, None),
        _ => (None, None),
    }
}

pub(crate) fn ec2_tags(tags: &[Tag]) -> Vec<Ec2Tag> {
    tags.iter()
        .map(|tag| Ec2Tag::builder().key(&tag.key).value(&tag.value).build())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::types::{EbsInstanceBlockDevice, InstanceBlockDeviceMapping, VolumeAttachment};
    use reseal_core::ProviderError;

    #[test]
    fn mappings_without_ebs_are_dropped() {
        let instance = Instance::builder()
            .block_device_mappings(
                InstanceBlockDeviceMapping::builder()
                    .device_name("/dev/xvda")
                    .ebs(
                        EbsInstanceBlockDevice::builder()
                            .volume_id("vol-root")
                            .delete_on_termination(true)
                            .build(),
                    )
                    .build(),
            )
            .block_device_mappings(
                InstanceBlockDeviceMapping::builder()
                    .device_name("/dev/sdb")
                    .build(),
            )
            .build();
        assert_eq!(
            attached_volumes(&instance),
            vec![AttachedVolume {
                volume_id: "vol-root".into(),
                device_path: Some("/dev/xvda".into()),
                delete_on_termination: Some(true),
            }]
        );
    }

    #[test]
    fn volume_record_reads_attachment_and_performance() -> ProviderResult<()> {
        let volume = Volume::builder()
            .volume_id("vol-1")
            .availability_zone("eu-central-1b")
            .volume_type(VolumeType::Io2)
            .encrypted(false)
            .size(50)
            .iops(6000)
            .attachments(
                VolumeAttachment::builder()
                    .device("/dev/sdf")
                    .delete_on_termination(false)
                    .build(),
            )
            .build();
        let record = volume_record(&volume)?;
        assert_eq!(record.volume_type, "io2");
        assert_eq!(record.device_path.as_deref(), Some("/dev/sdf"));
        assert_eq!(record.delete_on_termination, Some(false));
        assert_eq!(record.iops, Some(6000));
        assert!(!record.encrypted);
        Ok(())
    }

    #[test]
    fn volume_without_zone_is_rejected() {
        let volume = Volume::builder()
            .volume_id("vol-1")
            .volume_type(VolumeType::Gp2)
            .build();
        assert!(matches!(
            volume_record(&volume),
            Err(ProviderError::UnexpectedResponse {
                field: "availability_zone",
                ..
            })
        ));
    }

    #[test]
    fn performance_is_limited_to_supporting_types() {
        assert_eq!(
            provisioned_performance(&VolumeType::Gp3, Some(3000), Some(125)),
            (Some(3000), Some(125))
        );
        assert_eq!(
            provisioned_performance(&VolumeType::Io1, Some(4000), None),
            (Some(4000), None)
        );
        assert_eq!(
            provisioned_performance(&VolumeType::Gp2, Some(100), None),
            (None, None)
        );
    }

    #[test]
    fn tags_convert_key_and_value() {
        let converted = ec2_tags(&[Tag::new("reseal:source-volume", "vol-1")]);
        assert_eq!(converted[0].key(), Some("reseal:source-volume"));
        assert_eq!(converted[0].value(), Some("vol-1"));
    }
}
