//! Snapshot cleanup behaviour on already-swapped tasks.

use anyhow::{Result, anyhow};
use reseal_core::cleanup::cleanup_snapshots;
use reseal_core::{
    EncryptionService, EncryptionTask, StepJournal, StepKind, StepStatus, TaskPhase,
};
use reseal_telemetry::Metrics;
use reseal_test_support::fixtures::{TEST_INSTANCE, TEST_REGION, fast_settings, test_request};
use reseal_test_support::mocks::{FakeProvider, Fault, SeedVolume};

fn single_volume() -> FakeProvider {
    FakeProvider::new(TEST_REGION)
        .with_instance(TEST_INSTANCE)
        .with_volume(TEST_INSTANCE, SeedVolume::plain("vol-B", "/dev/sdf"))
}

async fn swapped_tasks(
    provider: FakeProvider,
) -> Result<(EncryptionService<FakeProvider>, Vec<EncryptionTask>)> {
    let service = EncryptionService::new(provider, fast_settings(), Metrics::new()?);
    let report = service
        .run(&test_request())
        .await
        .map_err(|aborted| anyhow!("run aborted: {:?}", aborted.error))?;
    Ok((service, report.tasks))
}

#[tokio::test]
async fn repeated_cleanup_is_a_no_op() -> Result<()> {
    let (service, mut tasks) = swapped_tasks(single_volume()).await?;
    let provider = service.provider();
    assert!(provider.snapshot_ids().is_empty());

    let mut journal = StepJournal::new(Metrics::new()?);
    let failures = cleanup_snapshots(provider, &mut tasks, &mut journal).await;
    assert!(failures.is_empty());
    assert_eq!(provider.count("delete_snapshot"), 1);
    assert_eq!(tasks[0].phase, TaskPhase::Cleaned);
    assert!(
        journal
            .records()
            .iter()
            .any(|record| record.status == StepStatus::Skipped)
    );
    Ok(())
}

#[tokio::test]
async fn failed_cleanup_can_be_retried() -> Result<()> {
    let provider = single_volume().with_fault("delete_snapshot", Fault::Api("throttled".into()));
    let (service, mut tasks) = swapped_tasks(provider).await?;
    let provider = service.provider();
    assert_eq!(tasks[0].phase, TaskPhase::Swapped);
    assert_eq!(provider.snapshot_ids().len(), 1);

    let mut journal = StepJournal::new(Metrics::new()?);
    provider.set_fault("delete_snapshot", Fault::NotFound);
    let failures = cleanup_snapshots(provider, &mut tasks, &mut journal).await;
    assert!(failures.is_empty());
    assert_eq!(tasks[0].phase, TaskPhase::Cleaned);
    Ok(())
}

#[tokio::test]
async fn retried_cleanup_deletes_the_remaining_snapshot() -> Result<()> {
    let provider = single_volume().with_fault("delete_snapshot", Fault::Api("throttled".into()));
    let (service, mut tasks) = swapped_tasks(provider).await?;
    let provider = service.provider();
    provider.clear_faults();

    let mut journal = StepJournal::new(Metrics::new()?);
    let failures = cleanup_snapshots(provider, &mut tasks, &mut journal).await;
    assert!(failures.is_empty());
    assert!(journal.completed(StepKind::DeleteSnapshot));
    assert!(provider.snapshot_ids().is_empty());
    assert_eq!(tasks[0].phase, TaskPhase::Cleaned);
    Ok(())
}

#[tokio::test]
async fn snapshot_removed_elsewhere_counts_as_cleaned() -> Result<()> {
    let provider = single_volume().with_fault("delete_snapshot", Fault::Api("throttled".into()));
    let (service, mut tasks) = swapped_tasks(provider).await?;
    let provider = service.provider();
    let snapshot_id = tasks[0]
        .snapshot_id
        .clone()
        .ok_or_else(|| anyhow!("task has no snapshot"))?;
    provider.remove_snapshot(&snapshot_id);
    let deletes_before = provider.count("delete_snapshot");

    let mut journal = StepJournal::new(Metrics::new()?);
    let failures = cleanup_snapshots(provider, &mut tasks, &mut journal).await;
    assert!(failures.is_empty());
    assert_eq!(tasks[0].phase, TaskPhase::Cleaned);
    assert_eq!(provider.count("delete_snapshot"), deletes_before);
    assert!(!journal.completed(StepKind::DeleteSnapshot));
    assert!(journal.records().iter().any(|record| {
        record.status == StepStatus::Skipped
            && record.detail.as_deref() == Some("snapshot already gone")
    }));
    Ok(())
}

#[tokio::test]
async fn tasks_short_of_swap_are_left_alone() -> Result<()> {
    let (service, mut tasks) = swapped_tasks(single_volume()).await?;
    tasks[0].phase = TaskPhase::Detached;
    let before = service.provider().calls().len();

    let mut journal = StepJournal::new(Metrics::new()?);
    let failures = cleanup_snapshots(service.provider(), &mut tasks, &mut journal).await;
    assert!(failures.is_empty());
    assert_eq!(service.provider().calls().len(), before);
    assert!(journal.records().is_empty());
    Ok(())
}
