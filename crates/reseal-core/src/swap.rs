//! Replace source attachments with their encrypted clones while the instance is stopped.
//!
//! # Design
//! - Tasks are validated into [`SwapTarget`]s before the instance is stopped, so a
//!   task without both ids can never leave the instance half-swapped.
//! - The instance is stopped once and started once, no matter how many tasks exist.
//! - Any failure aborts the remaining work. Nothing is rolled back; the task phases
//!   describe what was left behind.

use reseal_config::RunSettings;
use tracing::info;

use crate::clone::await_volume_state;
use crate::error::{RunError, RunResult};
use crate::journal::{StepJournal, StepKind, StepOutcome};
use crate::model::{EncryptionTask, InstanceState, RunContext, Tag, TaskPhase, VolumeState};
use crate::provider::CloudProvider;
use crate::wait::{PollStatus, RetryPolicy, wait_until};

/// A cloned task with every id the swap needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapTarget {
    /// Index of the task in the run's task list.
    pub index: usize,
    /// Source volume.
    pub volume_id: String,
    /// Intermediate snapshot.
    pub snapshot_id: String,
    /// Encrypted replacement.
    pub new_volume_id: String,
    /// Device the source is attached at and the replacement takes over.
    pub device_path: String,
    /// Original delete-on-termination attribute.
    pub delete_on_termination: Option<bool>,
}

impl SwapTarget {
    /// Validate a task for the swap stage.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::MissingState`] if the snapshot id, the replacement id or
    /// the device name is absent.
    pub fn from_task(index: usize, task: &EncryptionTask) -> RunResult<Self> {
        let missing = |field| RunError::MissingState {
            volume_id: task.volume_id().to_string(),
            field,
        };
        let snapshot_id = task.snapshot_id.clone().ok_or_else(|| missing("snapshot_id"))?;
        let new_volume_id = task
            .new_volume_id
            .clone()
            .ok_or_else(|| missing("new_volume_id"))?;
        let device_path = task
            .source_volume
            .device_path
            .clone()
            .ok_or_else(|| missing("device_path"))?;
        Ok(Self {
            index,
            volume_id: task.volume_id().to_string(),
            snapshot_id,
            new_volume_id,
            device_path,
            delete_on_termination: task.source_volume.delete_on_termination,
        })
    }
}

/// Validate every task; the first incomplete one fails the whole set.
///
/// # Errors
///
/// Returns [`RunError::MissingState`] for the first task lacking an id.
pub fn swap_targets(tasks: &[EncryptionTask]) -> RunResult<Vec<SwapTarget>> {
    tasks
        .iter()
        .enumerate()
        .map(|(index, task)| SwapTarget::from_task(index, task))
        .collect()
}

/// Stop the instance, swap every task in order, then start the instance.
/// Does nothing when `tasks` is empty.
///
/// # Errors
///
/// Returns the first validation, provider, timeout or terminal-state failure.
pub async fn swap_volumes<P>(
    provider: &P,
    context: &RunContext,
    settings: &RunSettings,
    tasks: &mut [EncryptionTask],
    journal: &mut StepJournal,
) -> RunResult<()>
where
    P: CloudProvider + ?Sized,
{
    if tasks.is_empty() {
        return Ok(());
    }
    let targets = swap_targets(tasks)?;
    let policy = RetryPolicy::from_settings(settings);
    let instance_id = context.instance_id.as_str();

    journal
        .execute(
            StepKind::StopInstance,
            instance_id,
            cycle_instance(provider, &policy, instance_id, Power::Stop),
        )
        .await?;

    for target in &targets {
        swap_one(provider, context, settings, &policy, target, tasks, journal).await?;
    }

    journal
        .execute(
            StepKind::StartInstance,
            instance_id,
            cycle_instance(provider, &policy, instance_id, Power::Start),
        )
        .await?;
    Ok(())
}

async fn swap_one<P>(
    provider: &P,
    context: &RunContext,
    settings: &RunSettings,
    policy: &RetryPolicy,
    target: &SwapTarget,
    tasks: &mut [EncryptionTask],
    journal: &mut StepJournal,
) -> RunResult<()>
where
    P: CloudProvider + ?Sized,
{
    let instance_id = context.instance_id.as_str();
    let volume_id = target.volume_id.as_str();
    let new_volume_id = target.new_volume_id.as_str();
    let device_path = target.device_path.as_str();

    journal
        .execute(StepKind::DetachVolume, volume_id, async {
            provider
                .detach_volume(instance_id, volume_id)
                .await
                .map_err(|source| RunError::provider("detach_volume", volume_id, source))?;
            await_volume_state(
                provider,
                policy,
                "await_detached",
                volume_id,
                &VolumeState::Available,
            )
            .await
        })
        .await?;
    tasks[target.index].phase = TaskPhase::Detached;
    info!(instance_id, volume_id, "source volume detached");

    journal
        .execute(StepKind::AttachVolume, new_volume_id, async {
            provider
                .attach_volume(instance_id, new_volume_id, device_path)
                .await
                .map_err(|source| RunError::provider("attach_volume", new_volume_id, source))?;
            await_volume_state(
                provider,
                policy,
                "await_attached",
                new_volume_id,
                &VolumeState::InUse,
            )
            .await?;
            Ok(((), StepOutcome::Completed(Some(device_path.to_string()))))
        })
        .await?;
    info!(instance_id, new_volume_id, device_path, "encrypted volume attached");

    journal
        .execute(StepKind::RestoreDeleteOnTermination, new_volume_id, async {
            let Some(flag) = target.delete_on_termination else {
                return Ok(((), StepOutcome::Skipped(Some("attribute unknown".into()))));
            };
            provider
                .set_delete_on_termination(instance_id, device_path, flag)
                .await
                .map_err(|source| {
                    RunError::provider("restore_delete_on_termination", device_path, source)
                })?;
            Ok(((), StepOutcome::Completed(Some(format!("{device_path}={flag}")))))
        })
        .await?;

    let tags = [Tag::new(&settings.remediation_tag_key, new_volume_id)];
    journal
        .execute(StepKind::TagSource, volume_id, async {
            provider
                .create_tags(volume_id, &tags)
                .await
                .map_err(|source| RunError::provider("tag_source", volume_id, source))?;
            Ok(((), StepOutcome::Completed(Some(new_volume_id.to_string()))))
        })
        .await?;
    tasks[target.index].phase = TaskPhase::Swapped;
    info!(
        instance_id,
        volume_id,
        new_volume_id,
        snapshot_id = %target.snapshot_id,
        "volume swapped"
    );
    Ok(())
}

#[derive(Clone, Copy)]
enum Power {
    Stop,
    Start,
}

async fn cycle_instance<P>(
    provider: &P,
    policy: &RetryPolicy,
    instance_id: &str,
    power: Power,
) -> RunResult<((), StepOutcome)>
where
    P: CloudProvider + ?Sized,
{
    let (operation, wait_operation, target) = match power {
        Power::Stop => {
            provider
                .stop_instance(instance_id)
                .await
                .map_err(|source| RunError::provider("stop_instance", instance_id, source))?;
            ("stop_instance", "await_stopped", InstanceState::Stopped)
        }
        Power::Start => {
            provider
                .start_instance(instance_id)
                .await
                .map_err(|source| RunError::provider("start_instance", instance_id, source))?;
            ("start_instance", "await_running", InstanceState::Running)
        }
    };
    info!(instance_id, operation, "instance power change requested");

    let target = &target;
    wait_until(policy, wait_operation, instance_id, move || async move {
        let state = provider
            .instance_state(instance_id)
            .await
            .map_err(|source| RunError::provider(wait_operation, instance_id, source))?;
        if &state == target {
            Ok(PollStatus::Ready(()))
        } else if state.is_terminal() {
            Err(RunError::TerminalState {
                operation: wait_operation,
                resource_id: instance_id.to_string(),
                state: state.as_str().to_string(),
            })
        } else {
            Ok(PollStatus::Pending(state.as_str().to_string()))
        }
    })
    .await?;
    Ok(((), StepOutcome::Completed(Some(target.as_str().to_string()))))
}
