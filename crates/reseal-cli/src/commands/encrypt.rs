//! Full encryption run.

use reseal_core::{CloudProvider, RunRequest};
use tracing::warn;

use crate::client::{AppContext, CliResult};
use crate::commands::{abort_failure, export_metrics};
use crate::output::{render_abort, render_report};

pub(crate) async fn handle_encrypt<P>(ctx: &AppContext<P>, request: &RunRequest) -> CliResult<()>
where
    P: CloudProvider,
{
    match ctx.service.run(request).await {
        Ok(report) => {
            export_metrics(ctx)?;
            render_report(&report, ctx.output)
        }
        Err(aborted) => {
            if let Err(err) = export_metrics(ctx) {
                warn!(error = %err.display_message(), "metrics export failed");
            }
            render_abort(&aborted, ctx.output)?;
            Err(abort_failure(aborted))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;
    use anyhow::{Result, anyhow};
    use reseal_core::{EncryptionService, InstanceState};
    use reseal_telemetry::Metrics;
    use reseal_test_support::fixtures::{TEST_INSTANCE, TEST_REGION, fast_settings, test_request};
    use reseal_test_support::mocks::{FakeProvider, Fault, SeedVolume};
    use std::path::PathBuf;

    fn context(
        provider: FakeProvider,
        metrics_file: Option<PathBuf>,
    ) -> Result<AppContext<FakeProvider>> {
        let metrics = Metrics::new()?;
        Ok(AppContext {
            service: EncryptionService::new(provider, fast_settings(), metrics.clone()),
            metrics,
            output: OutputFormat::Json,
            metrics_file,
        })
    }

    fn mixed_instance() -> FakeProvider {
        FakeProvider::new(TEST_REGION)
            .with_instance(TEST_INSTANCE)
            .with_volume(TEST_INSTANCE, SeedVolume::encrypted("vol-A", "/dev/xvda"))
            .with_volume(TEST_INSTANCE, SeedVolume::plain("vol-B", "/dev/sdf"))
    }

    #[tokio::test]
    async fn successful_run_writes_metrics_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("reseal.prom");
        let ctx = context(mixed_instance(), Some(path.clone()))?;

        handle_encrypt(&ctx, &test_request())
            .await
            .map_err(|err| anyhow!(err.display_message()))?;

        let exposition = std::fs::read_to_string(&path)?;
        assert!(exposition.contains("reseal_volumes_total"));
        assert_eq!(ctx.service.provider().count("stop_instance"), 1);
        assert_eq!(
            ctx.service.provider().current_instance_state(TEST_INSTANCE),
            Some(InstanceState::Running)
        );
        Ok(())
    }

    #[tokio::test]
    async fn abort_is_an_operational_failure() -> Result<()> {
        let provider =
            mixed_instance().with_fault("create_snapshot", Fault::Api("throttled".into()));
        let ctx = context(provider, None)?;

        let err = handle_encrypt(&ctx, &test_request())
            .await
            .err()
            .ok_or_else(|| anyhow!("run should abort"))?;

        assert_eq!(err.exit_code(), 3);
        assert!(
            err.display_message()
                .starts_with("create_snapshot failed for vol-B")
        );
        assert_eq!(ctx.service.provider().count("stop_instance"), 0);
        Ok(())
    }
}
