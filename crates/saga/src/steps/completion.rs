//! Terminal step: records that a saga has finished.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use messaging::Event;

use crate::error::ProcessingError;
use crate::handler::StepHandler;
use crate::steps::expect_event_type;
use crate::topology::SHIPPING_SCHEDULED;

/// Logs `shipping.scheduled` as the end of the saga and publishes nothing.
#[derive(Debug, Clone, Default)]
pub struct SagaCompletion {
    completed: Arc<AtomicU64>,
}

impl SagaCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sagas seen to completion.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StepHandler for SagaCompletion {
    fn name(&self) -> &str {
        "complete-saga"
    }

    async fn process(&self, event: &Event) -> Result<Option<Event>, ProcessingError> {
        expect_event_type(event, SHIPPING_SCHEDULED)?;
        self.completed.fetch_add(1, Ordering::Relaxed);

        let since_last_step_ms = (Utc::now() - event.occurred_at()).num_milliseconds().max(0);
        tracing::info!(
            saga_id = %event.saga_id(),
            order_id = %event.order_id(),
            status = event.payload_value("status").unwrap_or("unknown"),
            tracking_number = event.payload_value("tracking_number").unwrap_or_default(),
            since_last_step_ms,
            "saga completed"
        );
        Ok(None)
    }
}
