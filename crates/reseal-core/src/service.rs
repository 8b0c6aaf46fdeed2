//! Run-level orchestration tying the stages together.

use reseal_config::RunSettings;
use reseal_telemetry::{Metrics, record_run_outcome, run_span};
use tracing::{Instrument, error, info};
use uuid::Uuid;

use crate::classify::partition;
use crate::cleanup::cleanup_snapshots;
use crate::clone::clone_volumes;
use crate::error::{RunAborted, RunError};
use crate::journal::{ErrorChain, StepJournal};
use crate::locator::{list_attached_volumes, resolve_region};
use crate::model::{
    EncryptionTask, Partition, RunContext, RunPlan, RunReport, RunRequest, TaskPhase,
};
use crate::provider::CloudProvider;
use crate::swap::swap_volumes;

/// Drives one instance through locate, classify, clone, swap and cleanup.
pub struct EncryptionService<P> {
    provider: P,
    settings: RunSettings,
    metrics: Metrics,
}

impl<P> EncryptionService<P>
where
    P: CloudProvider,
{
    /// Build a service over `provider`.
    #[must_use]
    pub const fn new(provider: P, settings: RunSettings, metrics: Metrics) -> Self {
        Self {
            provider,
            settings,
            metrics,
        }
    }

    /// Provider the service drives.
    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Classify the instance's volumes without mutating anything.
    ///
    /// # Errors
    ///
    /// Returns [`RunAborted`] if the region or volumes cannot be resolved.
    pub async fn plan(&self, request: &RunRequest) -> Result<RunPlan, RunAborted> {
        let run_id = Uuid::new_v4().to_string();
        let span = run_span(&run_id, &request.instance_id);
        let result = async {
            let mut journal = StepJournal::new(self.metrics.clone());
            match self.discover(run_id, request, &mut journal).await {
                Ok((context, parts)) => {
                    info!(
                        tasks = parts.tasks.len(),
                        skipped = parts.skipped.len(),
                        "plan ready"
                    );
                    Ok(RunPlan {
                        context,
                        skipped: parts.skipped,
                        tasks: parts.tasks,
                    })
                }
                Err(err) => Err(abort(err, Vec::new(), journal)),
            }
        }
        .instrument(span.clone())
        .await;
        record_run_outcome(&span, if result.is_ok() { "planned" } else { "aborted" });
        result
    }

    /// Encrypt every unencrypted volume attached to the instance.
    ///
    /// # Errors
    ///
    /// Returns [`RunAborted`] on the first fatal failure, carrying the task
    /// phases and step journal at that point. Snapshot cleanup failures are
    /// reported in the [`RunReport`] instead.
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport, RunAborted> {
        let run_id = Uuid::new_v4().to_string();
        let span = run_span(&run_id, &request.instance_id);
        let result = self.execute(run_id, request).instrument(span.clone()).await;

        self.metrics.set_run_success(result.is_ok());
        match &result {
            Ok(report) => {
                self.metrics.set_cleanup_failures(report.cleanup_failures.len());
                record_run_outcome(&span, "completed");
            }
            Err(aborted) => {
                for task in aborted.tasks.iter().filter(|t| t.phase < TaskPhase::Swapped) {
                    self.metrics.inc_volume("aborted");
                    info!(
                        volume_id = %task.volume_id(),
                        phase = %task.phase,
                        "task left incomplete"
                    );
                }
                record_run_outcome(&span, "aborted");
            }
        }
        result
    }

    async fn execute(&self, run_id: String, request: &RunRequest) -> Result<RunReport, RunAborted> {
        let mut journal = StepJournal::new(self.metrics.clone());
        let (context, parts) = match self.discover(run_id, request, &mut journal).await {
            Ok(found) => found,
            Err(err) => return Err(abort(err, Vec::new(), journal)),
        };
        let Partition { skipped, mut tasks } = parts;

        if !context.any_volume_needs_encryption {
            info!("no unencrypted volumes attached; instance left running");
        }

        if let Err(err) = clone_volumes(
            &self.provider,
            &context,
            &self.settings,
            &mut tasks,
            &mut journal,
        )
        .await
        {
            return Err(abort(err, tasks, journal));
        }

        if let Err(err) = swap_volumes(
            &self.provider,
            &context,
            &self.settings,
            &mut tasks,
            &mut journal,
        )
        .await
        {
            return Err(abort(err, tasks, journal));
        }

        let cleanup_failures = cleanup_snapshots(&self.provider, &mut tasks, &mut journal).await;
        for _ in &tasks {
            self.metrics.inc_volume("encrypted");
        }
        info!(
            encrypted = tasks.len(),
            skipped = skipped.len(),
            cleanup_failures = cleanup_failures.len(),
            "encryption run completed"
        );

        Ok(RunReport {
            instance_cycled: context.any_volume_needs_encryption,
            context,
            skipped,
            tasks,
            cleanup_failures,
            steps: journal.into_records(),
        })
    }

    async fn discover(
        &self,
        run_id: String,
        request: &RunRequest,
        journal: &mut StepJournal,
    ) -> Result<(RunContext, Partition), RunError> {
        let region = resolve_region(&self.provider, journal).await?;
        let volumes = list_attached_volumes(&self.provider, &request.instance_id, journal).await?;
        let parts = partition(volumes);
        for skipped in &parts.skipped {
            self.metrics.inc_volume("skipped");
            info!(volume_id = %skipped.volume_id, reason = %skipped.reason, "volume skipped");
        }
        let context = RunContext {
            run_id,
            region,
            instance_id: request.instance_id.clone(),
            kms_key_id: request.kms_key_id.clone(),
            any_volume_needs_encryption: !parts.tasks.is_empty(),
        };
        Ok((context, parts))
    }
}

fn abort(error: RunError, tasks: Vec<EncryptionTask>, journal: StepJournal) -> RunAborted {
    error!(
        operation = error.operation(),
        resource_id = %error.resource_id(),
        error = %ErrorChain(&error),
        "encryption run aborted"
    );
    RunAborted {
        error: Box::new(error),
        tasks,
        steps: journal.into_records(),
    }
}
