//! Read-only discovery of the region and the instance's attached volumes.

use tracing::debug;

use crate::error::{ProviderError, RunError, RunResult};
use crate::journal::{StepJournal, StepKind, StepOutcome};
use crate::model::VolumeRecord;
use crate::provider::CloudProvider;

/// Resolve the region the provider is bound to.
///
/// # Errors
///
/// Returns a provider error when no region is configured or the provider reports an empty one.
pub async fn resolve_region<P>(provider: &P, journal: &mut StepJournal) -> RunResult<String>
where
    P: CloudProvider + ?Sized,
{
    journal
        .execute(StepKind::ResolveRegion, "region", async {
            let region = provider
                .resolve_region()
                .await
                .map_err(|source| RunError::provider("resolve_region", "region", source))?;
            let region = region.trim().to_string();
            if region.is_empty() {
                return Err(RunError::provider(
                    "resolve_region",
                    "region",
                    ProviderError::RegionUnavailable,
                ));
            }
            let detail = Some(region.clone());
            Ok((region, StepOutcome::Completed(detail)))
        })
        .await
}

/// Enumerate the instance's volumes in block device mapping order.
///
/// Device and delete-on-termination come from the instance mapping first and
/// fall back to the volume's own attachment metadata.
///
/// # Errors
///
/// Returns a provider error if the instance or any of its volumes cannot be described.
pub async fn list_attached_volumes<P>(
    provider: &P,
    instance_id: &str,
    journal: &mut StepJournal,
) -> RunResult<Vec<VolumeRecord>>
where
    P: CloudProvider + ?Sized,
{
    journal
        .execute(StepKind::ListVolumes, instance_id, async {
            let mappings = provider
                .describe_instance_volumes(instance_id)
                .await
                .map_err(|source| RunError::provider("list_volumes", instance_id, source))?;

            let mut volumes = Vec::with_capacity(mappings.len());
            for mapping in mappings {
                let described = provider
                    .describe_volume(&mapping.volume_id)
                    .await
                    .map_err(|source| {
                        RunError::provider("describe_volume", mapping.volume_id.clone(), source)
                    })?;
                let record = VolumeRecord {
                    device_path: mapping.device_path.or(described.device_path),
                    delete_on_termination: mapping
                        .delete_on_termination
                        .or(described.delete_on_termination),
                    ..described
                };
                debug!(
                    volume_id = %record.volume_id,
                    device = record.device_path.as_deref().unwrap_or("-"),
                    encrypted = record.encrypted,
                    "volume described"
                );
                volumes.push(record);
            }

            let detail = Some(format!("{} attached volume(s)", volumes.len()));
            Ok((volumes, StepOutcome::Completed(detail)))
        })
        .await
}
