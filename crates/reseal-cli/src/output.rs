//! Output renderers and formatting helpers for run results.

use std::error::Error;

use anyhow::anyhow;
use reseal_core::{EncryptionTask, RunAborted, RunPlan, RunReport, SkippedVolume, StepRecord};
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

pub(crate) fn render_report(report: &RunReport, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", to_json(report)?),
        OutputFormat::Table => println!("{}", report_table(report)),
    }
    Ok(())
}

pub(crate) fn render_plan(plan: &RunPlan, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", to_json(plan)?),
        OutputFormat::Table => println!("{}", plan_table(plan)),
    }
    Ok(())
}

/// Print what exists at the moment of an abort so it can be finished by hand.
pub(crate) fn render_abort(aborted: &RunAborted, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let summary = AbortSummary {
                error: error_chain(aborted.error.as_ref()),
                operation: aborted.error.operation(),
                resource_id: aborted.error.resource_id(),
                tasks: &aborted.tasks,
                steps: &aborted.steps,
            };
            println!("{}", to_json(&summary)?);
        }
        OutputFormat::Table => println!("{}", abort_table(aborted)),
    }
    Ok(())
}

#[derive(Serialize)]
struct AbortSummary<'a> {
    error: String,
    operation: &'static str,
    resource_id: &'a str,
    tasks: &'a [EncryptionTask],
    steps: &'a [StepRecord],
}

fn to_json<T: Serialize>(value: &T) -> CliResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
}

pub(crate) fn report_table(report: &RunReport) -> String {
    let context = &report.context;
    let mut lines = vec![format!(
        "run {} in {} for {}",
        context.run_id, context.region, context.instance_id
    )];
    lines.extend(task_rows(&report.tasks));
    lines.extend(skipped_rows(&report.skipped));
    for failure in &report.cleanup_failures {
        lines.push(format!(
            "cleanup failed for {} ({}): {}",
            failure.volume_id, failure.snapshot_id, failure.message
        ));
    }
    lines.push(if report.instance_cycled {
        "instance stopped and restarted".to_string()
    } else {
        "instance left running; nothing to encrypt".to_string()
    });
    lines.join("\n")
}

pub(crate) fn plan_table(plan: &RunPlan) -> String {
    let context = &plan.context;
    let mut lines = vec![format!(
        "dry run in {} for {}",
        context.region, context.instance_id
    )];
    lines.extend(task_rows(&plan.tasks));
    lines.extend(skipped_rows(&plan.skipped));
    lines.push(if context.any_volume_needs_encryption {
        format!(
            "{} volume(s) would be replaced; the instance would be stopped once",
            plan.tasks.len()
        )
    } else {
        "nothing to encrypt".to_string()
    });
    lines.join("\n")
}

pub(crate) fn abort_table(aborted: &RunAborted) -> String {
    let mut lines = vec![format!(
        "aborted during {} on {}",
        aborted.error.operation(),
        aborted.error.resource_id()
    )];
    lines.extend(task_rows(&aborted.tasks));
    if let Some(last) = aborted.steps.last() {
        lines.push(format!(
            "last step: {} {} ({})",
            last.step.as_str(),
            last.resource_id,
            last.status.as_str()
        ));
    }
    lines.join("\n")
}

fn task_rows(tasks: &[EncryptionTask]) -> Vec<String> {
    if tasks.is_empty() {
        return Vec::new();
    }
    let mut rows = vec![format!(
        "{:<22} {:<12} {:<12} {:<23} REPLACEMENT",
        "VOLUME", "DEVICE", "PHASE", "SNAPSHOT"
    )];
    for task in tasks {
        rows.push(format!(
            "{:<22} {:<12} {:<12} {:<23} {}",
            task.volume_id(),
            task.source_volume.device_path.as_deref().unwrap_or("-"),
            task.phase.as_str(),
            task.snapshot_id.as_deref().unwrap_or("-"),
            task.new_volume_id.as_deref().unwrap_or("-")
        ));
    }
    rows
}

fn skipped_rows(skipped: &[SkippedVolume]) -> Vec<String> {
    skipped
        .iter()
        .map(|volume| format!("skipped {}: {}", volume.volume_id, volume.reason))
        .collect()
}

fn error_chain(error: &(dyn Error + 'static)) -> String {
    std::iter::successors(Some(error), |current| current.source())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}
