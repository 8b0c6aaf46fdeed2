//! Best-effort deletion of intermediate snapshots after a successful swap.

use tracing::warn;

use crate::error::{RunError, RunResult};
use crate::journal::{ErrorChain, StepJournal, StepKind, StepOutcome};
use crate::model::{CleanupFailure, EncryptionTask, TaskPhase};
use crate::provider::CloudProvider;

/// Delete the snapshot of every swapped task. Failures are collected, never raised,
/// and a snapshot that is already gone counts as deleted. Safe to call repeatedly.
pub async fn cleanup_snapshots<P>(
    provider: &P,
    tasks: &mut [EncryptionTask],
    journal: &mut StepJournal,
) -> Vec<CleanupFailure>
where
    P: CloudProvider + ?Sized,
{
    let mut failures = Vec::new();
    for task in tasks.iter_mut().filter(|task| task.phase >= TaskPhase::Swapped) {
        let Some(snapshot_id) = task.snapshot_id.clone() else {
            continue;
        };
        match journal
            .execute(
                StepKind::DeleteSnapshot,
                &snapshot_id,
                delete_if_present(provider, &snapshot_id),
            )
            .await
        {
            Ok(()) => task.phase = TaskPhase::Cleaned,
            Err(err) => {
                let message = ErrorChain(&err).to_string();
                warn!(
                    volume_id = %task.volume_id(),
                    snapshot_id = %snapshot_id,
                    error = %message,
                    "snapshot cleanup failed"
                );
                failures.push(CleanupFailure {
                    volume_id: task.volume_id().to_string(),
                    snapshot_id,
                    message,
                });
            }
        }
    }
    failures
}

async fn delete_if_present<P>(provider: &P, snapshot_id: &str) -> RunResult<((), StepOutcome)>
where
    P: CloudProvider + ?Sized,
{
    let exists = provider
        .snapshot_exists(snapshot_id)
        .await
        .map_err(|source| RunError::provider("snapshot_exists", snapshot_id, source))?;
    if !exists {
        return Ok(((), StepOutcome::Skipped(Some("snapshot already gone".into()))));
    }
    match provider.delete_snapshot(snapshot_id).await {
        Ok(()) => Ok(((), StepOutcome::Completed(None))),
        Err(err) if err.is_not_found() => Ok((
            (),
            StepOutcome::Skipped(Some("snapshot removed concurrently".into())),
        )),
        Err(source) => Err(RunError::provider("delete_snapshot", snapshot_id, source)),
    }
}
