//! End-to-end runs against the in-memory provider.

use anyhow::{Result, anyhow};
use reseal_core::{
    EncryptionService, InstanceState, RunAborted, RunError, RunReport, SnapshotState, StepKind,
    StepStatus, TaskPhase,
};
use reseal_telemetry::Metrics;
use reseal_test_support::fixtures::{
    TEST_INSTANCE, TEST_KMS_KEY, TEST_REGION, fast_settings, test_request,
};
use reseal_test_support::mocks::{FakeProvider, Fault, ProviderCall, SeedVolume};

fn service(provider: FakeProvider) -> Result<EncryptionService<FakeProvider>> {
    Ok(EncryptionService::new(
        provider,
        fast_settings(),
        Metrics::new()?,
    ))
}

fn mixed_instance() -> FakeProvider {
    FakeProvider::new(TEST_REGION)
        .with_instance(TEST_INSTANCE)
        .with_volume(TEST_INSTANCE, SeedVolume::encrypted("vol-A", "/dev/xvda"))
        .with_volume(TEST_INSTANCE, SeedVolume::plain("vol-B", "/dev/sdf"))
}

async fn run_ok(service: &EncryptionService<FakeProvider>) -> Result<RunReport> {
    service
        .run(&test_request())
        .await
        .map_err(|aborted| anyhow!("run aborted: {:?}", aborted.error))
}

async fn run_aborted(service: &EncryptionService<FakeProvider>) -> Result<RunAborted> {
    match service.run(&test_request()).await {
        Ok(_) => Err(anyhow!("run unexpectedly succeeded")),
        Err(aborted) => Ok(aborted),
    }
}

#[tokio::test]
async fn only_unencrypted_volume_is_cloned_and_swapped() -> Result<()> {
    let service = service(mixed_instance())?;
    let report = run_ok(&service).await?;
    let provider = service.provider();

    assert_eq!(report.context.region, TEST_REGION);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].volume_id, "vol-A");
    assert_eq!(report.tasks.len(), 1);
    assert!(report.instance_cycled);
    assert!(report.cleanup_failures.is_empty());

    let task = &report.tasks[0];
    assert_eq!(task.volume_id(), "vol-B");
    assert_eq!(task.phase, TaskPhase::Cleaned);
    let new_volume_id = task.new_volume_id.clone().ok_or_else(|| anyhow!("no clone"))?;

    assert_eq!(
        provider.calls_to("create_snapshot"),
        vec![ProviderCall::CreateSnapshot {
            volume_id: "vol-B".into()
        }]
    );
    assert_eq!(provider.count("create_volume"), 1);
    assert_eq!(provider.count("stop_instance"), 1);
    assert_eq!(provider.count("start_instance"), 1);
    assert_eq!(
        provider.calls_to("detach_volume"),
        vec![ProviderCall::DetachVolume {
            instance_id: TEST_INSTANCE.into(),
            volume_id: "vol-B".into(),
        }]
    );
    assert_eq!(
        provider.calls_to("attach_volume"),
        vec![ProviderCall::AttachVolume {
            instance_id: TEST_INSTANCE.into(),
            volume_id: new_volume_id.clone(),
            device_path: "/dev/sdf".into(),
        }]
    );
    assert!(provider.snapshot_ids().is_empty());

    assert_eq!(
        provider.attachments(TEST_INSTANCE),
        vec![
            ("/dev/xvda".to_string(), "vol-A".to_string(), false),
            ("/dev/sdf".to_string(), new_volume_id, false),
        ]
    );
    assert_eq!(
        provider.current_instance_state(TEST_INSTANCE),
        Some(InstanceState::Running)
    );

    let untouched = provider.volume("vol-A").ok_or_else(|| anyhow!("vol-A gone"))?;
    assert!(untouched.tags.is_empty());
    Ok(())
}

#[tokio::test]
async fn clone_and_source_carry_linking_tags() -> Result<()> {
    let service = service(mixed_instance())?;
    let report = run_ok(&service).await?;
    let settings = fast_settings();
    let new_volume_id = report.tasks[0]
        .new_volume_id
        .clone()
        .ok_or_else(|| anyhow!("no clone"))?;

    let clone = service
        .provider()
        .volume(&new_volume_id)
        .ok_or_else(|| anyhow!("clone missing"))?;
    assert!(clone.record.encrypted);
    assert_eq!(clone.kms_key_id.as_deref(), Some(TEST_KMS_KEY));
    assert_eq!(clone.record.availability_zone, "us-east-1a");
    assert_eq!(clone.record.volume_type, "gp3");
    assert_eq!(clone.record.iops, Some(3000));
    assert!(
        clone
            .tags
            .iter()
            .any(|tag| tag.key == settings.provenance_tag_key && tag.value == "vol-B")
    );

    let source = service
        .provider()
        .volume("vol-B")
        .ok_or_else(|| anyhow!("source missing"))?;
    assert!(!source.record.encrypted);
    assert!(
        source
            .tags
            .iter()
            .any(|tag| tag.key == settings.remediation_tag_key && tag.value == new_volume_id)
    );
    Ok(())
}

#[tokio::test]
async fn fully_encrypted_instance_is_never_stopped() -> Result<()> {
    let provider = FakeProvider::new(TEST_REGION)
        .with_instance(TEST_INSTANCE)
        .with_volume(TEST_INSTANCE, SeedVolume::encrypted("vol-A", "/dev/xvda"))
        .with_volume(TEST_INSTANCE, SeedVolume::encrypted("vol-C", "/dev/sdg"));
    let service = service(provider)?;
    let report = run_ok(&service).await?;

    assert!(report.tasks.is_empty());
    assert!(!report.instance_cycled);
    assert!(!report.context.any_volume_needs_encryption);
    let provider = service.provider();
    assert_eq!(provider.count("stop_instance"), 0);
    assert_eq!(provider.count("start_instance"), 0);
    assert!(!provider.calls().iter().any(ProviderCall::is_mutation));
    Ok(())
}

#[tokio::test]
async fn swaps_follow_block_device_mapping_order() -> Result<()> {
    let provider = FakeProvider::new(TEST_REGION)
        .with_instance(TEST_INSTANCE)
        .with_volume(TEST_INSTANCE, SeedVolume::plain("vol-3", "/dev/xvda"))
        .with_volume(TEST_INSTANCE, SeedVolume::encrypted("vol-1", "/dev/sdb"))
        .with_volume(TEST_INSTANCE, SeedVolume::plain("vol-2", "/dev/sdc"))
        .with_volume(TEST_INSTANCE, SeedVolume::plain("vol-0", "/dev/sdd"));
    let service = service(provider)?;
    let report = run_ok(&service).await?;

    let task_order: Vec<_> = report.tasks.iter().map(|task| task.volume_id()).collect();
    assert_eq!(task_order, vec!["vol-3", "vol-2", "vol-0"]);

    let provider = service.provider();
    let detached: Vec<_> = provider
        .calls_to("detach_volume")
        .into_iter()
        .filter_map(|call| match call {
            ProviderCall::DetachVolume { volume_id, .. } => Some(volume_id),
            _ => None,
        })
        .collect();
    assert_eq!(detached, vec!["vol-3", "vol-2", "vol-0"]);
    assert_eq!(provider.count("stop_instance"), 1);
    assert_eq!(provider.count("start_instance"), 1);

    let operations: Vec<_> = provider
        .calls()
        .iter()
        .filter(|call| call.is_mutation())
        .map(ProviderCall::operation)
        .collect();
    let stop = operations.iter().position(|op| *op == "stop_instance");
    let last_clone = operations.iter().rposition(|op| *op == "create_volume");
    let first_detach = operations.iter().position(|op| *op == "detach_volume");
    let start = operations.iter().position(|op| *op == "start_instance");
    let first_delete = operations.iter().position(|op| *op == "delete_snapshot");
    assert!(last_clone < stop);
    assert!(stop < first_detach);
    assert!(first_detach < start);
    assert!(start < first_delete);
    Ok(())
}

#[tokio::test]
async fn delete_on_termination_is_reapplied() -> Result<()> {
    let provider = FakeProvider::new(TEST_REGION)
        .with_instance(TEST_INSTANCE)
        .with_volume(
            TEST_INSTANCE,
            SeedVolume::plain("vol-root", "/dev/xvda").delete_on_termination(true),
        );
    let service = service(provider)?;
    let report = run_ok(&service).await?;
    let new_volume_id = report.tasks[0]
        .new_volume_id
        .clone()
        .ok_or_else(|| anyhow!("no clone"))?;

    assert_eq!(
        service.provider().calls_to("set_delete_on_termination"),
        vec![ProviderCall::SetDeleteOnTermination {
            instance_id: TEST_INSTANCE.into(),
            device_path: "/dev/xvda".into(),
            delete_on_termination: true,
        }]
    );
    assert_eq!(
        service.provider().attachments(TEST_INSTANCE),
        vec![("/dev/xvda".to_string(), new_volume_id, true)]
    );
    Ok(())
}

#[tokio::test]
async fn clone_keeps_the_source_volume_type() -> Result<()> {
    let provider = FakeProvider::new(TEST_REGION)
        .with_instance(TEST_INSTANCE)
        .with_volume(
            TEST_INSTANCE,
            SeedVolume::plain("vol-db", "/dev/sdh").volume_type("io1"),
        );
    let service = service(provider)?;
    let report = run_ok(&service).await?;
    let new_volume_id = report.tasks[0]
        .new_volume_id
        .clone()
        .ok_or_else(|| anyhow!("no clone"))?;

    let clone = service
        .provider()
        .volume(&new_volume_id)
        .ok_or_else(|| anyhow!("clone missing"))?;
    assert_eq!(clone.record.volume_type, "io1");
    assert_eq!(clone.record.iops, Some(3000));
    assert_eq!(clone.record.size_gib, Some(20));
    Ok(())
}

#[tokio::test]
async fn volume_without_device_is_left_unencrypted_and_untagged() -> Result<()> {
    let provider = mixed_instance()
        .with_volume(TEST_INSTANCE, SeedVolume::plain("vol-U", "/dev/sdz").without_device());
    let service = service(provider)?;
    let report = run_ok(&service).await?;
    let provider = service.provider();

    let skipped: Vec<_> = report
        .skipped
        .iter()
        .map(|volume| (volume.volume_id.as_str(), volume.reason.as_str()))
        .collect();
    assert_eq!(
        skipped,
        vec![("vol-A", "already encrypted"), ("vol-U", "no device path")]
    );
    assert_eq!(report.tasks.len(), 1);
    assert_eq!(report.tasks[0].volume_id(), "vol-B");
    assert!(report.instance_cycled);

    assert_eq!(
        provider.calls_to("create_snapshot"),
        vec![ProviderCall::CreateSnapshot {
            volume_id: "vol-B".into()
        }]
    );
    assert_eq!(provider.count("stop_instance"), 1);
    assert_eq!(provider.count("start_instance"), 1);
    let tagged: Vec<_> = provider
        .calls_to("create_tags")
        .into_iter()
        .filter_map(|call| match call {
            ProviderCall::CreateTags { resource_id, .. } => Some(resource_id),
            _ => None,
        })
        .collect();
    assert!(!tagged.iter().any(|resource_id| resource_id == "vol-U"));
    let untouched = provider.volume("vol-U").ok_or_else(|| anyhow!("vol-U gone"))?;
    assert!(untouched.tags.is_empty());
    assert!(!untouched.record.encrypted);
    Ok(())
}

#[tokio::test]
async fn instance_with_only_unswappable_volumes_keeps_running() -> Result<()> {
    let provider = FakeProvider::new(TEST_REGION)
        .with_instance(TEST_INSTANCE)
        .with_volume(TEST_INSTANCE, SeedVolume::plain("vol-U", "/dev/sdz").without_device());
    let service = service(provider)?;
    let report = run_ok(&service).await?;

    assert!(report.tasks.is_empty());
    assert_eq!(report.skipped[0].reason, "no device path");
    assert!(!report.instance_cycled);
    assert!(!report.context.any_volume_needs_encryption);
    let provider = service.provider();
    assert_eq!(provider.count("create_snapshot"), 0);
    assert_eq!(provider.count("stop_instance"), 0);
    assert!(!provider.calls().iter().any(ProviderCall::is_mutation));
    assert_eq!(
        provider.current_instance_state(TEST_INSTANCE),
        Some(InstanceState::Running)
    );
    Ok(())
}

#[tokio::test]
async fn unknown_delete_on_termination_is_not_restored() -> Result<()> {
    let provider = FakeProvider::new(TEST_REGION)
        .with_instance(TEST_INSTANCE)
        .with_volume(
            TEST_INSTANCE,
            SeedVolume::plain("vol-B", "/dev/sdf").without_delete_on_termination(),
        );
    let service = service(provider)?;
    let report = run_ok(&service).await?;

    assert_eq!(report.tasks[0].phase, TaskPhase::Cleaned);
    assert_eq!(service.provider().count("set_delete_on_termination"), 0);
    assert_eq!(service.provider().count("attach_volume"), 1);
    let restore = report
        .steps
        .iter()
        .rfind(|record| record.step == StepKind::RestoreDeleteOnTermination)
        .ok_or_else(|| anyhow!("restore step not journaled"))?;
    assert_eq!(restore.status, StepStatus::Skipped);
    assert_eq!(restore.detail.as_deref(), Some("attribute unknown"));
    Ok(())
}

#[tokio::test]
async fn snapshot_failure_aborts_before_stopping() -> Result<()> {
    let provider = mixed_instance().with_fault(
        "create_snapshot",
        Fault::Api("SnapshotLimitExceeded".into()),
    );
    let service = service(provider)?;
    let aborted = run_aborted(&service).await?;

    assert!(matches!(
        *aborted.error,
        RunError::Provider {
            operation: "create_snapshot",
            ..
        }
    ));
    assert_eq!(aborted.tasks.len(), 1);
    assert_eq!(aborted.tasks[0].phase, TaskPhase::Pending);
    assert!(aborted.tasks[0].snapshot_id.is_none());

    let provider = service.provider();
    assert_eq!(provider.count("stop_instance"), 0);
    assert_eq!(provider.count("start_instance"), 0);
    assert_eq!(
        provider.current_instance_state(TEST_INSTANCE),
        Some(InstanceState::Running)
    );
    let failed = aborted
        .steps
        .iter()
        .find(|record| record.status == StepStatus::Failed)
        .ok_or_else(|| anyhow!("no failed step"))?;
    assert_eq!(failed.step, StepKind::CreateSnapshot);
    assert_eq!(failed.resource_id, "vol-B");
    Ok(())
}

#[tokio::test]
async fn attach_failure_leaves_instance_stopped_and_source_detached() -> Result<()> {
    let provider =
        mixed_instance().with_fault("attach_volume", Fault::Api("InvalidParameterValue".into()));
    let service = service(provider)?;
    let aborted = run_aborted(&service).await?;

    assert!(matches!(
        *aborted.error,
        RunError::Provider {
            operation: "attach_volume",
            ..
        }
    ));
    let task = &aborted.tasks[0];
    assert_eq!(task.phase, TaskPhase::Detached);
    assert!(task.snapshot_id.is_some());
    assert!(task.new_volume_id.is_some());

    let provider = service.provider();
    assert_eq!(provider.count("stop_instance"), 1);
    assert_eq!(provider.count("start_instance"), 0);
    assert_eq!(provider.count("delete_snapshot"), 0);
    assert_eq!(provider.count("create_tags"), 0);
    assert_eq!(
        provider.current_instance_state(TEST_INSTANCE),
        Some(InstanceState::Stopped)
    );
    assert_eq!(
        provider.attachments(TEST_INSTANCE),
        vec![("/dev/xvda".to_string(), "vol-A".to_string(), false)]
    );
    assert_eq!(provider.snapshot_ids().len(), 1);
    Ok(())
}

#[tokio::test]
async fn detach_failure_keeps_task_cloned() -> Result<()> {
    let provider =
        mixed_instance().with_fault("detach_volume", Fault::Api("IncorrectState".into()));
    let service = service(provider)?;
    let aborted = run_aborted(&service).await?;

    assert!(matches!(
        *aborted.error,
        RunError::Provider {
            operation: "detach_volume",
            ..
        }
    ));
    assert_eq!(aborted.tasks[0].phase, TaskPhase::Cloned);
    let provider = service.provider();
    assert_eq!(provider.count("attach_volume"), 0);
    assert_eq!(provider.count("create_tags"), 0);
    assert_eq!(provider.count("start_instance"), 0);
    Ok(())
}

#[tokio::test]
async fn snapshot_error_state_is_fatal() -> Result<()> {
    let provider = mixed_instance().with_snapshot_outcome(SnapshotState::Error);
    let service = service(provider)?;
    let aborted = run_aborted(&service).await?;

    match aborted.error.as_ref() {
        RunError::TerminalState {
            operation, state, ..
        } => {
            assert_eq!(*operation, "await_snapshot");
            assert_eq!(state, "error");
        }
        other => return Err(anyhow!("unexpected error: {other:?}")),
    }
    assert_eq!(aborted.tasks[0].phase, TaskPhase::Pending);
    assert!(aborted.tasks[0].snapshot_id.is_some());
    assert_eq!(service.provider().count("create_volume"), 0);
    assert_eq!(service.provider().count("stop_instance"), 0);
    Ok(())
}

#[tokio::test]
async fn bounded_polling_times_out() -> Result<()> {
    let provider = mixed_instance().with_settle_polls(100);
    let service = service(provider)?;
    let aborted = run_aborted(&service).await?;

    match aborted.error.as_ref() {
        RunError::WaitTimedOut {
            operation,
            attempts,
            last_state,
            ..
        } => {
            assert_eq!(*operation, "await_snapshot");
            assert_eq!(Some(*attempts), fast_settings().max_poll_attempts);
            assert_eq!(last_state, "pending");
        }
        other => return Err(anyhow!("unexpected error: {other:?}")),
    }
    Ok(())
}

#[tokio::test]
async fn terminated_instance_aborts_the_stop() -> Result<()> {
    let provider = mixed_instance().with_stop_outcome(InstanceState::Terminated);
    let service = service(provider)?;
    let aborted = run_aborted(&service).await?;

    assert!(matches!(
        *aborted.error,
        RunError::TerminalState {
            operation: "await_stopped",
            ..
        }
    ));
    assert_eq!(aborted.tasks[0].phase, TaskPhase::Cloned);
    assert_eq!(service.provider().count("detach_volume"), 0);
    Ok(())
}

#[tokio::test]
async fn cleanup_failures_do_not_fail_the_run() -> Result<()> {
    let provider = FakeProvider::new(TEST_REGION)
        .with_instance(TEST_INSTANCE)
        .with_volume(TEST_INSTANCE, SeedVolume::plain("vol-1", "/dev/xvda"))
        .with_volume(TEST_INSTANCE, SeedVolume::plain("vol-2", "/dev/sdf"))
        .with_fault("delete_snapshot", Fault::Api("throttled".into()));
    let service = service(provider)?;
    let report = run_ok(&service).await?;

    assert_eq!(report.cleanup_failures.len(), 2);
    assert_eq!(report.cleanup_failures[0].volume_id, "vol-1");
    assert!(report.cleanup_failures[0].message.contains("throttled"));
    assert!(
        report
            .tasks
            .iter()
            .all(|task| task.phase == TaskPhase::Swapped)
    );
    assert_eq!(service.provider().count("delete_snapshot"), 2);
    assert_eq!(service.provider().snapshot_ids().len(), 2);
    Ok(())
}

#[tokio::test]
async fn plan_classifies_without_mutating() -> Result<()> {
    let service = service(mixed_instance())?;
    let plan = service
        .plan(&test_request())
        .await
        .map_err(|aborted| anyhow!("plan aborted: {:?}", aborted.error))?;

    assert_eq!(plan.context.instance_id, TEST_INSTANCE);
    assert!(plan.context.any_volume_needs_encryption);
    assert_eq!(plan.tasks.len(), 1);
    assert_eq!(plan.skipped.len(), 1);
    assert!(!service.provider().calls().iter().any(ProviderCall::is_mutation));
    Ok(())
}

#[tokio::test]
async fn unknown_instance_aborts_during_discovery() -> Result<()> {
    let provider = FakeProvider::new(TEST_REGION);
    let service = service(provider)?;
    let aborted = run_aborted(&service).await?;

    assert!(matches!(
        *aborted.error,
        RunError::Provider {
            operation: "list_volumes",
            ..
        }
    ));
    assert!(aborted.tasks.is_empty());
    Ok(())
}
