//! EC2 implementation of the provider seam.
//!
//! Each trait method issues exactly one API call. Service errors whose code ends
//! in `.NotFound` surface as `ProviderError::NotFound`.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types::{
    EbsInstanceBlockDeviceSpecification, InstanceBlockDeviceMappingSpecification, ResourceType,
    TagSpecification, VolumeType,
};
use reseal_core::{
    AttachedVolume, CloudProvider, InstanceState, ProviderError, ProviderResult, SnapshotState,
    Tag, VolumeRecord, VolumeSpec, VolumeState,
};
use tracing::debug;

use crate::convert::{attached_volumes, ec2_tags, provisioned_performance, volume_record};
use crate::error::{map_sdk_error, missing};

/// [`CloudProvider`] backed by the EC2 API in the ambient region.
#[derive(Clone, Debug)]
pub struct Ec2Provider {
    client: Client,
    region: Option<String>,
}

impl Ec2Provider {
    /// Load credentials and region from the standard provider chain.
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let region = config.region().map(|region| region.as_ref().to_string());
        debug!(region = region.as_deref().unwrap_or("-"), "aws configuration loaded");
        Self {
            client: Client::new(&config),
            region,
        }
    }
}

#[async_trait]
impl CloudProvider for Ec2Provider {
    async fn resolve_region(&self) -> ProviderResult<String> {
        self.region.clone().ok_or(ProviderError::RegionUnavailable)
    }

    async fn describe_instance_volumes(
        &self,
        instance_id: &str,
    ) -> ProviderResult<Vec<AttachedVolume>> {
        let output = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|err| map_sdk_error("describe_instances", instance_id, &err))?;
        let instance = output
            .reservations()
            .iter()
            .flat_map(|reservation| reservation.instances())
            .find(|instance| instance.instance_id() == Some(instance_id))
            .ok_or_else(|| ProviderError::NotFound {
                resource_id: instance_id.to_string(),
            })?;
        Ok(attached_volumes(instance))
    }

    async fn describe_volume(&self, volume_id: &str) -> ProviderResult<VolumeRecord> {
        let output = self
            .client
            .describe_volumes()
            .volume_ids(volume_id)
            .send()
            .await
            .map_err(|err| map_sdk_error("describe_volumes", volume_id, &err))?;
        let volume = output
            .volumes()
            .first()
            .ok_or_else(|| ProviderError::NotFound {
                resource_id: volume_id.to_string(),
            })?;
        volume_record(volume)
    }

    async fn create_snapshot(
        &self,
        volume_id: &str,
        description: &str,
    ) -> ProviderResult<String> {
        let output = self
            .client
            .create_snapshot()
            .volume_id(volume_id)
            .description(description)
            .send()
            .await
            .map_err(|err| map_sdk_error("create_snapshot", volume_id, &err))?;
        output
            .snapshot_id()
            .map(str::to_string)
            .ok_or_else(|| missing("create_snapshot", "snapshot_id"))
    }

    async fn snapshot_state(&self, snapshot_id: &str) -> ProviderResult<SnapshotState> {
        let output = self
            .client
            .describe_snapshots()
            .snapshot_ids(snapshot_id)
            .send()
            .await
            .map_err(|err| map_sdk_error("describe_snapshots", snapshot_id, &err))?;
        output
            .snapshots()
            .first()
            .and_then(|snapshot| snapshot.state())
            .map(|state| SnapshotState::parse(state.as_str()))
            .ok_or_else(|| missing("describe_snapshots", "state"))
    }

    async fn snapshot_exists(&self, snapshot_id: &str) -> ProviderResult<bool> {
        match self
            .client
            .describe_snapshots()
            .snapshot_ids(snapshot_id)
            .send()
            .await
        {
            Ok(output) => Ok(!output.snapshots().is_empty()),
            Err(err) => {
                let mapped = map_sdk_error("describe_snapshots", snapshot_id, &err);
                if mapped.is_not_found() {
                    Ok(false)
                } else {
                    Err(mapped)
                }
            }
        }
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> ProviderResult<String> {
        let volume_type = VolumeType::from(spec.volume_type.as_str());
        let (iops, throughput) =
            provisioned_performance(&volume_type, spec.iops, spec.throughput);
        let output = self
            .client
            .create_volume()
            .snapshot_id(&spec.snapshot_id)
            .availability_zone(&spec.availability_zone)
            .volume_type(volume_type)
            .encrypted(true)
            .kms_key_id(&spec.kms_key_id)
            .set_size(spec.size_gib)
            .set_iops(iops)
            .set_throughput(throughput)
            .tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Volume)
                    .set_tags(Some(ec2_tags(&spec.tags)))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| map_sdk_error("create_volume", &spec.snapshot_id, &err))?;
        output
            .volume_id()
            .map(str::to_string)
            .ok_or_else(|| missing("create_volume", "volume_id"))
    }

    async fn stop_instance(&self, instance_id: &str) -> ProviderResult<()> {
        self.client
            .stop_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|err| map_sdk_error("stop_instances", instance_id, &err))?;
        Ok(())
    }

    async fn instance_state(&self, instance_id: &str) -> ProviderResult<InstanceState> {
        let output = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|err| map_sdk_error("describe_instances", instance_id, &err))?;
        output
            .reservations()
            .iter()
            .flat_map(|reservation| reservation.instances())
            .find(|instance| instance.instance_id() == Some(instance_id))
            .and_then(|instance| instance.state())
            .and_then(|state| state.name())
            .map(|name| InstanceState::parse(name.as_str()))
            .ok_or_else(|| missing("describe_instances", "state"))
    }

    async fn detach_volume(&self, instance_id: &str, volume_id: &str) -> ProviderResult<()> {
        self.client
            .detach_volume()
            .instance_id(instance_id)
            .volume_id(volume_id)
            .send()
            .await
            .map_err(|err| map_sdk_error("detach_volume", volume_id, &err))?;
        Ok(())
    }

    async fn volume_state(&self, volume_id: &str) -> ProviderResult<VolumeState> {
        let output = self
            .client
            .describe_volumes()
            .volume_ids(volume_id)
            .send()
            .await
            .map_err(|err| map_sdk_error("describe_volumes", volume_id, &err))?;
        output
            .volumes()
            .first()
            .and_then(|volume| volume.state())
            .map(|state| VolumeState::parse(state.as_str()))
            .ok_or_else(|| missing("describe_volumes", "state"))
    }

    async fn attach_volume(
        &self,
        instance_id: &str,
        volume_id: &str,
        device_path: &str,
    ) -> ProviderResult<()> {
        self.client
            .attach_volume()
            .instance_id(instance_id)
            .volume_id(volume_id)
            .device(device_path)
            .send()
            .await
            .map_err(|err| map_sdk_error("attach_volume", volume_id, &err))?;
        Ok(())
    }

    async fn set_delete_on_termination(
        &self,
        instance_id: &str,
        device_path: &str,
        delete_on_termination: bool,
    ) -> ProviderResult<()> {
        self.client
            .modify_instance_attribute()
            .instance_id(instance_id)
            .block_device_mappings(
                InstanceBlockDeviceMappingSpecification::builder()
                    .device_name(device_path)
                    .ebs(
                        EbsInstanceBlockDeviceSpecification::builder()
                            .delete_on_termination(delete_on_termination)
                            .build(),
                    )
                    .build(),
            )
            .send()
            .await
            .map_err(|err| map_sdk_error("modify_instance_attribute", instance_id, &err))?;
        Ok(())
    }

    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> ProviderResult<()> {
        self.client
            .create_tags()
            .resources(resource_id)
            .set_tags(Some(ec2_tags(tags)))
            .send()
            .await
            .map_err(|err| map_sdk_error("create_tags", resource_id, &err))?;
        Ok(())
    }

    async fn start_instance(&self, instance_id: &str) -> ProviderResult<()> {
        self.client
            .start_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|err| map_sdk_error("start_instances", instance_id, &err))?;
        Ok(())
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> ProviderResult<()> {
        self.client
            .delete_snapshot()
            .snapshot_id(snapshot_id)
            .send()
            .await
            .map_err(|err| map_sdk_error("delete_snapshot", snapshot_id, &err))?;
        Ok(())
    }
}
