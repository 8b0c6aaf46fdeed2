//! Error types for provider calls and encryption runs.

use std::error::Error;

use thiserror::Error;

use crate::journal::StepRecord;
use crate::model::EncryptionTask;

/// Failure reported by a [`crate::CloudProvider`] implementation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider API rejected or failed the call.
    #[error("provider api call failed")]
    Api {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The addressed resource does not exist.
    #[error("provider resource not found")]
    NotFound {
        /// Missing resource identifier.
        resource_id: String,
    },
    /// The provider answered without a field the workflow needs.
    #[error("provider response missing field")]
    UnexpectedResponse {
        /// Operation identifier.
        operation: &'static str,
        /// Missing or malformed field.
        field: &'static str,
    },
    /// No region could be resolved from the ambient configuration.
    #[error("provider region unavailable")]
    RegionUnavailable,
}

impl ProviderError {
    /// Build an `Api` error from a plain message.
    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            operation,
            source: message.into().into(),
        }
    }

    /// Whether this error means the resource is gone.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience alias for provider results.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Fatal failure of one orchestration step.
#[derive(Debug, Error)]
pub enum RunError {
    /// A provider call failed.
    #[error("provider call failed")]
    Provider {
        /// Orchestration operation that issued the call.
        operation: &'static str,
        /// Resource the call addressed.
        resource_id: String,
        /// Provider failure.
        #[source]
        source: ProviderError,
    },
    /// A wait loop hit its attempt bound.
    #[error("timed out waiting for resource state")]
    WaitTimedOut {
        /// Wait operation.
        operation: &'static str,
        /// Resource being polled.
        resource_id: String,
        /// Polls performed.
        attempts: u32,
        /// Last observed state.
        last_state: String,
    },
    /// A polled resource reached a state it cannot leave.
    #[error("resource entered a terminal state")]
    TerminalState {
        /// Wait operation.
        operation: &'static str,
        /// Resource being polled.
        resource_id: String,
        /// Observed state.
        state: String,
    },
    /// A task reached a stage without the ids that stage needs.
    #[error("task is missing required state")]
    MissingState {
        /// Source volume of the task.
        volume_id: String,
        /// Missing field.
        field: &'static str,
    },
}

impl RunError {
    /// Wrap a provider failure with the operation and resource it addressed.
    pub fn provider(
        operation: &'static str,
        resource_id: impl Into<String>,
        source: ProviderError,
    ) -> Self {
        Self::Provider {
            operation,
            resource_id: resource_id.into(),
            source,
        }
    }

    /// Operation the failure belongs to.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Provider { operation, .. }
            | Self::WaitTimedOut { operation, .. }
            | Self::TerminalState { operation, .. } => operation,
            Self::MissingState { .. } => "validate_swap",
        }
    }

    /// Resource the failure refers to.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        match self {
            Self::Provider { resource_id, .. }
            | Self::WaitTimedOut { resource_id, .. }
            | Self::TerminalState { resource_id, .. } => resource_id,
            Self::MissingState { volume_id, .. } => volume_id,
        }
    }
}

/// Convenience alias for orchestration results.
pub type RunResult<T> = Result<T, RunError>;

/// A run stopped on a fatal error, with everything created so far.
#[derive(Debug, Error)]
#[error("encryption run aborted")]
pub struct RunAborted {
    /// Fatal error.
    #[source]
    pub error: Box<RunError>,
    /// Tasks with their phase at the time of the abort.
    pub tasks: Vec<EncryptionTask>,
    /// Step journal up to the abort.
    pub steps: Vec<StepRecord>,
}
