//! Command handlers for the run and dry-run modes.

pub(crate) mod encrypt;
pub(crate) mod plan;

use reseal_core::{RunAborted, RunError};

use crate::client::{AppContext, CliError, CliResult};

/// Write the metrics registry when `--metrics-file` was given.
pub(crate) fn export_metrics<P>(ctx: &AppContext<P>) -> CliResult<()> {
    if let Some(path) = &ctx.metrics_file {
        ctx.metrics.write_textfile(path).map_err(CliError::failure)?;
        tracing::info!(path = %path.display(), "metrics written");
    }
    Ok(())
}

/// Turn an abort into a failure whose message names the failed step.
pub(crate) fn abort_failure(aborted: RunAborted) -> CliError {
    let context = describe(&aborted.error);
    CliError::failure(anyhow::Error::new(aborted).context(context))
}

fn describe(error: &RunError) -> String {
    match error {
        RunError::Provider {
            operation,
            resource_id,
            ..
        } => format!("{operation} failed for {resource_id}"),
        RunError::WaitTimedOut {
            operation,
            resource_id,
            attempts,
            last_state,
        } => format!(
            "{operation} for {resource_id} gave up after {attempts} probes in state {last_state}"
        ),
        RunError::TerminalState {
            operation,
            resource_id,
            state,
        } => format!("{operation} for {resource_id} observed terminal state {state}"),
        RunError::MissingState { volume_id, field } => {
            format!("task for {volume_id} has no {field}")
        }
    }
}
