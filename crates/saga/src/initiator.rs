//! Periodic source of new order sagas.

use std::sync::Arc;
use std::time::Duration;

use messaging::{Event, EventBus, PublishError};
use tokio::time::MissedTickBehavior;

use crate::metrics::ServiceMetrics;
use crate::topology::ORDER_CREATED;

pub const SAMPLE_CUSTOMER: &str = "sample-customer";
pub const SAMPLE_AMOUNT: &str = "99.99";

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Publishes a fresh `order.created` event on every tick.
pub struct OrderInitiator<B: ?Sized> {
    bus: Arc<B>,
    metrics: ServiceMetrics,
    interval: Duration,
}

impl<B> OrderInitiator<B>
where
    B: EventBus + ?Sized,
{
    /// An `interval` below one millisecond is raised to one millisecond.
    pub fn new(bus: Arc<B>, metrics: ServiceMetrics, interval: Duration) -> Self {
        Self {
            bus,
            metrics,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Builds the event that starts a new saga.
    pub fn order_created(&self) -> Event {
        Event::initiate(
            ORDER_CREATED,
            self.metrics.service(),
            [("customer", SAMPLE_CUSTOMER), ("amount", SAMPLE_AMOUNT)],
        )
    }

    /// Starts one saga.
    #[tracing::instrument(skip(self))]
    pub async fn start_saga(&self) -> Result<Event, PublishError> {
        let event = self.order_created();
        match self.bus.publish(ORDER_CREATED, &event).await {
            Ok(()) => {
                self.metrics.record_published();
                tracing::info!(
                    saga_id = %event.saga_id(),
                    order_id = %event.order_id(),
                    "saga started"
                );
                Ok(event)
            }
            Err(e) => {
                self.metrics.record_failed();
                tracing::warn!(error = %e, "failed to publish order.created");
                Err(e)
            }
        }
    }

    /// Starts a saga immediately and then once per interval, forever.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            // Failures are counted and logged; the next tick tries again.
            let _ = self.start_saga().await;
        }
    }
}
