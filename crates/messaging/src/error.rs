//! Bus error types.

use thiserror::Error;

/// Errors raised while establishing the broker connection and topology.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The broker could not be reached or refused the connection.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A channel could not be opened on an established connection.
    #[error("Failed to open channel: {0}")]
    Channel(String),

    /// The exchange exists with properties that differ from ours.
    #[error("Topology mismatch: {0}")]
    Topology(String),
}

/// Errors raised by [`Event::decode`](crate::Event::decode).
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body is not a well-formed event document.
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A field the next step cannot act without is absent or empty.
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
}

/// Errors raised while publishing an event.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The event could not be serialized. Retrying reproduces the failure.
    #[error("Failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    /// Channel-level I/O failure.
    #[error("Channel error: {0}")]
    Channel(String),

    /// The bus was closed before the publish.
    #[error("Bus is closed")]
    Closed,
}

impl PublishError {
    /// Returns true if redelivering the inbound message may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, PublishError::Encode(_))
    }
}

/// Errors raised while setting up or reading a consumer.
#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("Failed to declare queue '{queue}': {reason}")]
    Declare { queue: String, reason: String },

    #[error("Failed to bind queue '{queue}' to '{routing_key}': {reason}")]
    Bind {
        queue: String,
        routing_key: String,
        reason: String,
    },

    #[error("Failed to start consumer on '{queue}': {reason}")]
    Subscribe { queue: String, reason: String },

    /// The delivery stream failed after it was established.
    #[error("Consumer stream error: {0}")]
    Stream(String),

    #[error("Bus is closed")]
    Closed,
}

/// Failure to send an acknowledgement decision to the broker.
#[derive(Debug, Error)]
#[error("Acknowledgement failed: {0}")]
pub struct AckError(pub String);
