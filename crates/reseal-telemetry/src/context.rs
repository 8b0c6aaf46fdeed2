//! Run-level span helpers.

use tracing::Span;

use crate::init::build_sha;

/// Build the span that wraps one encryption run. `outcome` is recorded on completion.
#[must_use]
pub fn run_span(run_id: &str, instance_id: &str) -> Span {
    tracing::info_span!(
        "reseal_run",
        run_id = %run_id,
        instance_id = %instance_id,
        build_sha = %build_sha(),
        outcome = tracing::field::Empty
    )
}

/// Record the final outcome (`completed`, `aborted`, `planned`) on a run span.
pub fn record_run_outcome(span: &Span, outcome: &str) {
    span.record("outcome", tracing::field::display(outcome));
}
