//! Saga error types.

use std::time::Duration;

use messaging::ConsumeError;
use thiserror::Error;

/// Why a step handler could not turn an event into its successor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingError {
    /// The step's work failed; retrying may succeed.
    #[error("Step failed: {0}")]
    Failed(String),

    /// The step did not finish within the configured timeout.
    #[error("Step timed out after {0:?}")]
    Timeout(Duration),

    /// The event can never be processed by this step.
    #[error("Event rejected: {0}")]
    Rejected(String),
}

impl ProcessingError {
    /// Transient failures are requeued, permanent ones are dropped.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ProcessingError::Rejected(_))
    }
}

/// Errors that stop a saga participant.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Subscribing to the inbound topic or reading deliveries failed.
    #[error("Consume error: {0}")]
    Consume(#[from] ConsumeError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
