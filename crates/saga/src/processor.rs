//! Consume → process → publish loop for one saga step.
//!
//! Every delivery is settled exactly once before the next one is read:
//!
//! | Outcome                          | Settlement     | Counters              |
//! |----------------------------------|----------------|-----------------------|
//! | body does not decode             | `nack(false)`  | failed                |
//! | already completed (duplicate)    | `ack`          | consumed              |
//! | handler fails transiently        | `nack(true)`   | consumed, failed      |
//! | handler rejects the event        | `nack(false)`  | consumed, failed      |
//! | successor publish fails          | `nack(requeue)`| consumed, failed      |
//! | successor published / terminal   | `ack`          | consumed, published?  |

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use messaging::{AckError, Delivery, Event, EventBus};

use crate::dedupe::ProcessedLog;
use crate::error::{ProcessingError, Result};
use crate::handler::StepHandler;
use crate::metrics::ServiceMetrics;
use crate::topology::Subscription;

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Processed (and successor published, if any), then acked.
    Completed,
    /// Already completed earlier; acked without running the handler.
    Duplicate,
    /// Nacked without requeue.
    Dropped,
    /// Nacked with requeue.
    Requeued,
}

/// Tuning for a [`StepProcessor`].
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Upper bound on a single handler call.
    pub step_timeout: Duration,
    /// Number of completed inbound events remembered for deduplication.
    pub dedupe_capacity: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(5),
            dedupe_capacity: 10_000,
        }
    }
}

/// Drives one [`StepHandler`] from a single queue, one delivery at a time.
pub struct StepProcessor<B: ?Sized, H> {
    bus: Arc<B>,
    handler: H,
    metrics: ServiceMetrics,
    subscription: Subscription,
    step_timeout: Duration,
    processed: ProcessedLog,
}

impl<B, H> StepProcessor<B, H>
where
    B: EventBus + ?Sized,
    H: StepHandler,
{
    pub fn new(
        bus: Arc<B>,
        handler: H,
        metrics: ServiceMetrics,
        subscription: Subscription,
    ) -> Self {
        Self::with_config(bus, handler, metrics, subscription, ProcessorConfig::default())
    }

    pub fn with_config(
        bus: Arc<B>,
        handler: H,
        metrics: ServiceMetrics,
        subscription: Subscription,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            bus,
            handler,
            metrics,
            subscription,
            step_timeout: config.step_timeout,
            processed: ProcessedLog::new(config.dedupe_capacity),
        }
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Subscribes and handles deliveries until the stream ends.
    ///
    /// Returns `Ok(())` when the bus is closed and an error when the
    /// subscription cannot be set up or the consumer stream fails.
    #[tracing::instrument(
        skip(self),
        fields(
            step = %self.handler.name(),
            queue = %self.subscription.queue,
            routing_key = %self.subscription.routing_key,
        )
    )]
    pub async fn run(mut self) -> Result<()> {
        let mut deliveries = self
            .bus
            .consume(&self.subscription.queue, &self.subscription.routing_key)
            .await?;
        tracing::info!("waiting for events");

        while let Some(delivery) = deliveries.next().await {
            let delivery = delivery?;
            self.handle_delivery(delivery).await;
        }

        tracing::info!("delivery stream ended");
        Ok(())
    }

    /// Decodes, processes and settles a single delivery.
    pub async fn handle_delivery(&mut self, delivery: Delivery) -> DeliveryOutcome {
        let event = match Event::decode(delivery.body()) {
            Ok(event) => event,
            Err(e) => {
                self.metrics.record_failed();
                tracing::warn!(
                    error = %e,
                    queue = %self.subscription.queue,
                    routing_key = %delivery.routing_key(),
                    bytes = delivery.body().len(),
                    "dropping undecodable delivery"
                );
                self.settle(delivery.nack(false).await);
                return DeliveryOutcome::Dropped;
            }
        };
        self.metrics.record_consumed();

        if self.processed.contains(&event) {
            tracing::info!(
                saga_id = %event.saga_id(),
                event_type = %event.event_type(),
                redelivered = delivery.redelivered(),
                "event already processed, acknowledging duplicate"
            );
            self.settle(delivery.ack().await);
            return DeliveryOutcome::Duplicate;
        }

        let processed = tokio::time::timeout(self.step_timeout, self.handler.process(&event))
            .await
            .unwrap_or(Err(ProcessingError::Timeout(self.step_timeout)));

        let successor = match processed {
            Ok(successor) => successor,
            Err(e) => {
                self.metrics.record_failed();
                let requeue = e.is_transient();
                tracing::warn!(
                    error = %e,
                    step = %self.handler.name(),
                    saga_id = %event.saga_id(),
                    order_id = %event.order_id(),
                    requeue,
                    "step processing failed"
                );
                self.settle(delivery.nack(requeue).await);
                return if requeue {
                    DeliveryOutcome::Requeued
                } else {
                    DeliveryOutcome::Dropped
                };
            }
        };

        if let Some(next) = successor {
            if let Err(e) = self.bus.publish(next.event_type(), &next).await {
                self.metrics.record_failed();
                let requeue = e.is_transient();
                if requeue {
                    tracing::warn!(
                        error = %e,
                        saga_id = %event.saga_id(),
                        routing_key = %next.event_type(),
                        "failed to publish successor, requeueing"
                    );
                } else {
                    tracing::error!(
                        error = %e,
                        saga_id = %event.saga_id(),
                        routing_key = %next.event_type(),
                        "successor cannot be encoded, dropping"
                    );
                }
                self.settle(delivery.nack(requeue).await);
                return if requeue {
                    DeliveryOutcome::Requeued
                } else {
                    DeliveryOutcome::Dropped
                };
            }
            self.metrics.record_published();
            tracing::info!(
                saga_id = %next.saga_id(),
                order_id = %next.order_id(),
                event_type = %next.event_type(),
                "published successor"
            );
        }

        self.processed.record(&event);
        self.settle(delivery.ack().await);
        DeliveryOutcome::Completed
    }

    fn settle(&self, result: std::result::Result<(), AckError>) {
        if let Err(e) = result {
            tracing::warn!(
                error = %e,
                queue = %self.subscription.queue,
                "failed to settle delivery"
            );
        }
    }
}
