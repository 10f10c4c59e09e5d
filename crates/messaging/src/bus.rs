//! Event bus abstraction.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::delivery::Delivery;
use crate::error::{ConsumeError, PublishError};
use crate::event::Event;

/// Name of the shared durable topic exchange every service publishes to.
pub const EXCHANGE: &str = "saga.events";

/// Lazy, unbounded stream of deliveries from one queue. It cannot be
/// restarted; consuming again creates a new consumer.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, ConsumeError>> + Send>>;

/// Topic-based publish/subscribe over the shared exchange.
///
/// Implementations serialize access to their channel internally, so one bus
/// may be shared between a consume loop and any number of publishers.
///
/// Implementations:
/// - `AmqpBus`: RabbitMQ via AMQP 0-9-1
/// - `InMemoryBus`: in-process topic exchange for tests and local runs
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Encodes `event` and publishes it under `routing_key`.
    ///
    /// Returns once the message is handed to the channel; there is no
    /// broker-side confirmation.
    async fn publish(&self, routing_key: &str, event: &Event) -> Result<(), PublishError>;

    /// Declares the durable queue `queue`, binds it to the exchange under
    /// `routing_key`, and starts a manual-acknowledgement consumer.
    ///
    /// Each distinct queue receives its own copy of every matching event;
    /// consumers sharing a queue name split its deliveries between them.
    async fn consume(&self, queue: &str, routing_key: &str)
    -> Result<DeliveryStream, ConsumeError>;

    /// Releases the channel, then the connection. Idempotent.
    async fn close(&self);
}
