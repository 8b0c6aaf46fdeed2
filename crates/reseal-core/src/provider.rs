//! Cloud provider seam consumed by the orchestration stages.

use async_trait::async_trait;

use crate::error::ProviderResult;
use crate::model::{
    AttachedVolume, InstanceState, SnapshotState, Tag, VolumeRecord, VolumeSpec, VolumeState,
};

/// Resource API used by a run. Implementations are bound to a single region.
///
/// Every method is a single provider call; waiting for state transitions is
/// built on top of the `*_state` probes by [`crate::wait::wait_until`].
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Region the client is bound to.
    async fn resolve_region(&self) -> ProviderResult<String>;

    /// Block device mapping of an instance, in mapping order.
    async fn describe_instance_volumes(
        &self,
        instance_id: &str,
    ) -> ProviderResult<Vec<AttachedVolume>>;

    /// Full description of one volume.
    async fn describe_volume(&self, volume_id: &str) -> ProviderResult<VolumeRecord>;

    /// Start a snapshot of `volume_id`; returns the snapshot id.
    async fn create_snapshot(&self, volume_id: &str, description: &str)
    -> ProviderResult<String>;

    /// Current snapshot state.
    async fn snapshot_state(&self, snapshot_id: &str) -> ProviderResult<SnapshotState>;

    /// Whether a snapshot still exists.
    async fn snapshot_exists(&self, snapshot_id: &str) -> ProviderResult<bool>;

    /// Create a volume from a snapshot; returns the volume id.
    async fn create_volume(&self, spec: &VolumeSpec) -> ProviderResult<String>;

    /// Request an instance stop.
    async fn stop_instance(&self, instance_id: &str) -> ProviderResult<()>;

    /// Current instance state.
    async fn instance_state(&self, instance_id: &str) -> ProviderResult<InstanceState>;

    /// Detach a volume from an instance.
    async fn detach_volume(&self, instance_id: &str, volume_id: &str) -> ProviderResult<()>;

    /// Current volume state.
    async fn volume_state(&self, volume_id: &str) -> ProviderResult<VolumeState>;

    /// Attach a volume at `device_path`.
    async fn attach_volume(
        &self,
        instance_id: &str,
        volume_id: &str,
        device_path: &str,
    ) -> ProviderResult<()>;

    /// Set the delete-on-termination attribute of the mapping at `device_path`.
    async fn set_delete_on_termination(
        &self,
        instance_id: &str,
        device_path: &str,
        delete_on_termination: bool,
    ) -> ProviderResult<()>;

    /// Add tags to a resource.
    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> ProviderResult<()>;

    /// Request an instance start.
    async fn start_instance(&self, instance_id: &str) -> ProviderResult<()>;

    /// Delete a snapshot.
    async fn delete_snapshot(&self, snapshot_id: &str) -> ProviderResult<()>;
}
