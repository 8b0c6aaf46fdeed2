//! Snapshot each unencrypted volume and restore it into an encrypted clone.
//!
//! Exactly one snapshot and one volume are created per task. The source volume
//! is never modified here.

use reseal_config::RunSettings;
use tracing::info;

use crate::error::{RunError, RunResult};
use crate::journal::{StepJournal, StepKind, StepOutcome};
use crate::model::{
    EncryptionTask, RunContext, SnapshotState, Tag, TaskPhase, VolumeSpec, VolumeState,
};
use crate::provider::CloudProvider;
use crate::wait::{PollStatus, RetryPolicy, wait_until};

/// Clone every task in order. The first failure aborts the loop; tasks keep
/// whatever ids were created before it.
///
/// # Errors
///
/// Returns the first provider, timeout or terminal-state failure.
pub async fn clone_volumes<P>(
    provider: &P,
    context: &RunContext,
    settings: &RunSettings,
    tasks: &mut [EncryptionTask],
    journal: &mut StepJournal,
) -> RunResult<()>
where
    P: CloudProvider + ?Sized,
{
    let policy = RetryPolicy::from_settings(settings);
    for task in tasks.iter_mut() {
        clone_volume(provider, context, settings, &policy, task, journal).await?;
    }
    Ok(())
}

async fn clone_volume<P>(
    provider: &P,
    context: &RunContext,
    settings: &RunSettings,
    policy: &RetryPolicy,
    task: &mut EncryptionTask,
    journal: &mut StepJournal,
) -> RunResult<()>
where
    P: CloudProvider + ?Sized,
{
    let volume_id = task.source_volume.volume_id.clone();
    let description = settings.snapshot_description_for(&volume_id);

    let snapshot_id = journal
        .execute(StepKind::CreateSnapshot, &volume_id, async {
            let snapshot_id = provider
                .create_snapshot(&volume_id, &description)
                .await
                .map_err(|source| {
                    RunError::provider("create_snapshot", volume_id.as_str(), source)
                })?;
            let detail = Some(snapshot_id.clone());
            Ok((snapshot_id, StepOutcome::Completed(detail)))
        })
        .await?;
    info!(volume_id = %volume_id, snapshot_id = %snapshot_id, "snapshot started");
    task.snapshot_id = Some(snapshot_id.clone());

    journal
        .execute(
            StepKind::AwaitSnapshot,
            &snapshot_id,
            await_snapshot(provider, policy, &snapshot_id),
        )
        .await?;
    task.phase = TaskPhase::Snapshotted;

    let spec = VolumeSpec {
        snapshot_id: snapshot_id.clone(),
        availability_zone: task.source_volume.availability_zone.clone(),
        volume_type: task.source_volume.volume_type.clone(),
        kms_key_id: context.kms_key_id.clone(),
        size_gib: task.source_volume.size_gib,
        iops: task.source_volume.iops,
        throughput: task.source_volume.throughput,
        tags: vec![Tag::new(&settings.provenance_tag_key, &volume_id)],
    };
    let new_volume_id = journal
        .execute(StepKind::CreateVolume, &volume_id, async {
            let new_volume_id = provider
                .create_volume(&spec)
                .await
                .map_err(|source| {
                    RunError::provider("create_volume", snapshot_id.as_str(), source)
                })?;
            let detail = Some(new_volume_id.clone());
            Ok((new_volume_id, StepOutcome::Completed(detail)))
        })
        .await?;
    info!(
        volume_id = %volume_id,
        snapshot_id = %snapshot_id,
        new_volume_id = %new_volume_id,
        "encrypted volume created"
    );
    task.new_volume_id = Some(new_volume_id.clone());

    journal
        .execute(
            StepKind::AwaitVolume,
            &new_volume_id,
            await_volume_state(
                provider,
                policy,
                "await_volume",
                &new_volume_id,
                &VolumeState::Available,
            ),
        )
        .await?;
    task.phase = TaskPhase::Cloned;
    Ok(())
}

async fn await_snapshot<P>(
    provider: &P,
    policy: &RetryPolicy,
    snapshot_id: &str,
) -> RunResult<((), StepOutcome)>
where
    P: CloudProvider + ?Sized,
{
    wait_until(policy, "await_snapshot", snapshot_id, move || async move {
        let state = provider
            .snapshot_state(snapshot_id)
            .await
            .map_err(|source| RunError::provider("await_snapshot", snapshot_id, source))?;
        match state {
            SnapshotState::Completed => Ok(PollStatus::Ready(())),
            SnapshotState::Error => Err(RunError::TerminalState {
                operation: "await_snapshot",
                resource_id: snapshot_id.to_string(),
                state: state.as_str().to_string(),
            }),
            other => Ok(PollStatus::Pending(other.as_str().to_string())),
        }
    })
    .await?;
    Ok(((), StepOutcome::Completed(Some("completed".into()))))
}

/// Poll a volume until it reaches `target`. Deleting, deleted and error states end the wait.
pub(crate) async fn await_volume_state<P>(
    provider: &P,
    policy: &RetryPolicy,
    operation: &'static str,
    volume_id: &str,
    target: &VolumeState,
) -> RunResult<((), StepOutcome)>
where
    P: CloudProvider + ?Sized,
{
    wait_until(policy, operation, volume_id, move || async move {
        let state = provider
            .volume_state(volume_id)
            .await
            .map_err(|source| RunError::provider(operation, volume_id, source))?;
        if &state == target {
            Ok(PollStatus::Ready(()))
        } else if state.is_terminal() {
            Err(RunError::TerminalState {
                operation,
                resource_id: volume_id.to_string(),
                state: state.as_str().to_string(),
            })
        } else {
            Ok(PollStatus::Pending(state.as_str().to_string()))
        }
    })
    .await?;
    Ok(((), StepOutcome::Completed(Some(target.as_str().to_string()))))
}
