//! Polling helper shared by every wait-for-state transition.

use std::future::Future;
use std::time::Duration;

use reseal_config::RunSettings;
use tracing::debug;

use crate::error::{RunError, RunResult};

/// How often and how many times a wait loop polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between polls.
    pub interval: Duration,
    /// Poll bound; `None` polls until the resource settles.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Policy derived from run settings.
    #[must_use]
    pub const fn from_settings(settings: &RunSettings) -> Self {
        Self {
            interval: settings.poll_interval,
            max_attempts: settings.max_poll_attempts,
        }
    }
}

/// Result of a single state probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    /// The desired state was reached.
    Ready(T),
    /// Not there yet; carries the observed state.
    Pending(String),
}

/// Poll `probe` until it reports [`PollStatus::Ready`].
///
/// The first probe runs immediately; later probes are spaced by the policy
/// interval. Probe errors end the wait immediately.
///
/// # Errors
///
/// Returns the probe's error, or [`RunError::WaitTimedOut`] once the attempt bound is hit.
pub async fn wait_until<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    resource_id: &str,
    mut probe: F,
) -> RunResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RunResult<PollStatus<T>>>,
{
    let mut attempts: u32 = 0;
    loop {
        attempts = attempts.saturating_add(1);
        match probe().await? {
            PollStatus::Ready(value) => {
                debug!(operation, resource_id, attempts, "wait satisfied");
                return Ok(value);
            }
            PollStatus::Pending(state) => {
                debug!(operation, resource_id, attempts, state = %state, "still waiting");
                if let Some(max) = policy.max_attempts
                    && attempts >= max
                {
                    return Err(RunError::WaitTimedOut {
                        operation,
                        resource_id: resource_id.to_string(),
                        attempts,
                        last_state: state,
                    });
                }
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}
