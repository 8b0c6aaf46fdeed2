//! Step journal recording every orchestration step of a run.
//!
//! # Design
//! - Each step is recorded as `started` and then exactly one of `completed`, `skipped` or `failed`.
//! - Every record increments `reseal_steps_total{step,status}`.
//! - The journal is owned by the run and copied into the report or abort.

use std::future::Future;

use chrono::{DateTime, Utc};
use reseal_telemetry::Metrics;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::RunResult;

/// Orchestration steps in pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Resolve the ambient region.
    ResolveRegion,
    /// Enumerate attached volumes.
    ListVolumes,
    /// Snapshot a source volume.
    CreateSnapshot,
    /// Wait for a snapshot to complete.
    AwaitSnapshot,
    /// Create the encrypted clone.
    CreateVolume,
    /// Wait for the clone to become available.
    AwaitVolume,
    /// Stop the instance and wait for `stopped`.
    StopInstance,
    /// Detach the source and wait for `available`.
    DetachVolume,
    /// Attach the clone and wait for `in-use`.
    AttachVolume,
    /// Reapply delete-on-termination.
    RestoreDeleteOnTermination,
    /// Tag the source with its replacement.
    TagSource,
    /// Start the instance and wait for `running`.
    StartInstance,
    /// Delete an intermediate snapshot.
    DeleteSnapshot,
}

impl StepKind {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResolveRegion => "resolve_region",
            Self::ListVolumes => "list_volumes",
            Self::CreateSnapshot => "create_snapshot",
            Self::AwaitSnapshot => "await_snapshot",
            Self::CreateVolume => "create_volume",
            Self::AwaitVolume => "await_volume",
            Self::StopInstance => "stop_instance",
            Self::DetachVolume => "detach_volume",
            Self::AttachVolume => "attach_volume",
            Self::RestoreDeleteOnTermination => "restore_delete_on_termination",
            Self::TagSource => "tag_source",
            Self::StartInstance => "start_instance",
            Self::DeleteSnapshot => "delete_snapshot",
        }
    }
}

/// Status of a journal entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step began.
    Started,
    /// Step finished.
    Completed,
    /// Step failed.
    Failed,
    /// Step had nothing to do.
    Skipped,
}

impl StepStatus {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    /// Step kind.
    pub step: StepKind,
    /// Resource the step acted on.
    pub resource_id: String,
    /// Entry status.
    pub status: StepStatus,
    /// Optional human-readable detail.
    pub detail: Option<String>,
    /// Time the entry was written.
    pub updated_at: DateTime<Utc>,
}

/// How a successful step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step did its work.
    Completed(Option<String>),
    /// Step decided there was nothing to do.
    Skipped(Option<String>),
}

impl StepOutcome {
    const fn status(&self) -> StepStatus {
        match self {
            Self::Completed(_) => StepStatus::Completed,
            Self::Skipped(_) => StepStatus::Skipped,
        }
    }

    fn into_detail(self) -> Option<String> {
        match self {
            Self::Completed(detail) | Self::Skipped(detail) => detail,
        }
    }
}

/// Ordered record of the steps taken by a run.
#[derive(Clone)]
pub struct StepJournal {
    metrics: Metrics,
    records: Vec<StepRecord>,
}

impl StepJournal {
    /// Empty journal reporting into `metrics`.
    #[must_use]
    pub const fn new(metrics: Metrics) -> Self {
        Self {
            metrics,
            records: Vec::new(),
        }
    }

    /// Entries recorded so far.
    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Consume the journal, returning its entries.
    #[must_use]
    pub fn into_records(self) -> Vec<StepRecord> {
        self.records
    }

    /// Whether `step` has completed at least once.
    #[must_use]
    pub fn completed(&self, step: StepKind) -> bool {
        self.records
            .iter()
            .any(|record| record.step == step && record.status == StepStatus::Completed)
    }

    /// Run `op` as `step` against `resource_id`, journaling start and outcome.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `op` after recording it as failed.
    pub async fn execute<T, Fut>(
        &mut self,
        step: StepKind,
        resource_id: &str,
        op: Fut,
    ) -> RunResult<T>
    where
        Fut: Future<Output = RunResult<(T, StepOutcome)>>,
    {
        info!(step = step.as_str(), resource_id, "step started");
        self.record(step, resource_id, StepStatus::Started, None);

        match op.await {
            Ok((value, outcome)) => {
                let status = outcome.status();
                let detail = outcome.into_detail();
                info!(
                    step = step.as_str(),
                    resource_id,
                    status = status.as_str(),
                    detail = detail.as_deref().unwrap_or_default(),
                    "step finished"
                );
                self.record(step, resource_id, status, detail);
                Ok(value)
            }
            Err(err) => {
                let detail = format!("{}", ErrorChain(&err));
                warn!(step = step.as_str(), resource_id, error = %detail, "step failed");
                self.record(step, resource_id, StepStatus::Failed, Some(detail));
                Err(err)
            }
        }
    }

    fn record(
        &mut self,
        step: StepKind,
        resource_id: &str,
        status: StepStatus,
        detail: Option<String>,
    ) {
        self.metrics.inc_step(step.as_str(), status.as_str());
        self.records.push(StepRecord {
            step,
            resource_id: resource_id.to_string(),
            status,
            detail,
            updated_at: Utc::now(),
        });
    }
}

/// Renders an error followed by its `source` chain, `: `-separated.
pub(crate) struct ErrorChain<'a>(pub(crate) &'a (dyn std::error::Error + 'static));

impl std::fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)?;
        let mut current = self.0.source();
        while let Some(cause) = current {
            write!(f, ": {cause}")?;
            current = cause.source();
        }
        Ok(())
    }
}
