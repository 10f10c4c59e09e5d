//! Shipment scheduling step.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::SagaId;
use messaging::Event;
use tokio::sync::RwLock;

use crate::error::ProcessingError;
use crate::handler::StepHandler;
use crate::steps::{DEFAULT_RETAINED_SAGAS, expect_event_type};
use crate::topology::{INVENTORY_RESERVED, SHIPPING_SCHEDULED, SHIPPING_SERVICE};

#[derive(Debug, Default)]
struct ScheduleState {
    shipments: HashMap<SagaId, String>,
    arrival: VecDeque<SagaId>,
    capacity: usize,
    next_id: u32,
    fail_on_schedule: bool,
}

/// In-memory stand-in for a carrier. One shipment per saga, at most
/// `capacity` retained.
#[derive(Debug, Clone)]
pub struct ShipmentSchedule {
    state: Arc<RwLock<ScheduleState>>,
}

impl Default for ShipmentSchedule {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RETAINED_SAGAS)
    }
}

impl ShipmentSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let state = ScheduleState {
            capacity: capacity.max(1),
            ..ScheduleState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub async fn set_fail_on_schedule(&self, fail: bool) {
        self.state.write().await.fail_on_schedule = fail;
    }

    /// Schedules a shipment and returns its tracking number.
    pub async fn schedule(&self, saga_id: &SagaId) -> Result<String, ProcessingError> {
        let mut state = self.state.write().await;

        if state.fail_on_schedule {
            return Err(ProcessingError::Failed("carrier unavailable".to_string()));
        }

        if let Some(tracking_number) = state.shipments.get(saga_id) {
            return Ok(tracking_number.clone());
        }

        state.next_id += 1;
        let tracking_number = format!("TRACK-{:04}", state.next_id);
        state
            .shipments
            .insert(saga_id.clone(), tracking_number.clone());
        state.arrival.push_back(saga_id.clone());
        while state.arrival.len() > state.capacity {
            if let Some(oldest) = state.arrival.pop_front() {
                state.shipments.remove(&oldest);
            }
        }
        Ok(tracking_number)
    }

    pub async fn shipment_count(&self) -> usize {
        self.state.read().await.shipments.len()
    }
}

/// Reacts to `inventory.reserved` by scheduling a shipment and emitting
/// `shipping.scheduled`.
#[derive(Debug, Clone)]
pub struct ShippingStep {
    schedule: ShipmentSchedule,
    latency: Duration,
}

impl ShippingStep {
    pub fn new(schedule: ShipmentSchedule, latency: Duration) -> Self {
        Self { schedule, latency }
    }

    pub fn schedule(&self) -> &ShipmentSchedule {
        &self.schedule
    }
}

#[async_trait]
impl StepHandler for ShippingStep {
    fn name(&self) -> &str {
        "schedule-shipping"
    }

    async fn process(&self, event: &Event) -> Result<Option<Event>, ProcessingError> {
        expect_event_type(event, INVENTORY_RESERVED)?;
        tracing::info!(
            saga_id = %event.saga_id(),
            order_id = %event.order_id(),
            reservation_id = event.payload_value("reservation_id").unwrap_or_default(),
            "scheduling shipment"
        );

        tokio::time::sleep(self.latency).await;
        let tracking_number = self.schedule.schedule(event.saga_id()).await?;

        Ok(Some(event.successor(
            SHIPPING_SCHEDULED,
            SHIPPING_SERVICE,
            [
                ("status", "completed".to_string()),
                ("tracking_number", tracking_number),
            ],
        )))
    }
}
