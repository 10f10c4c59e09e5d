//! Service start-up and run-time errors.

use metrics_exporter_prometheus::BuildError;
use saga::SagaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The Prometheus recorder could not be installed.
    #[error("Failed to install metrics recorder: {0}")]
    Metrics(#[from] BuildError),

    /// The HTTP listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an error.
    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),

    /// A saga participant stopped with an error.
    #[error(transparent)]
    Saga(#[from] SagaError),

    /// A background task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
