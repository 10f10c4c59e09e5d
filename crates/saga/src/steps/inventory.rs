//! Stock reservation step.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, SagaId};
use messaging::Event;
use tokio::sync::RwLock;

use crate::error::ProcessingError;
use crate::handler::StepHandler;
use crate::steps::{DEFAULT_RETAINED_SAGAS, expect_event_type};
use crate::topology::{INVENTORY_RESERVED, INVENTORY_SERVICE, ORDER_CREATED};

#[derive(Debug, Default)]
struct LedgerState {
    reservations: HashMap<SagaId, (String, OrderId)>,
    arrival: VecDeque<SagaId>,
    capacity: usize,
    next_id: u32,
    fail_on_reserve: bool,
}

/// In-memory stand-in for a stock service. One reservation per saga.
///
/// Holds at most `capacity` reservations; the oldest is forgotten first.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl Default for InventoryLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RETAINED_SAGAS)
    }
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let state = LedgerState {
            capacity: capacity.max(1),
            ..LedgerState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Makes every following reservation fail until reset.
    pub async fn set_fail_on_reserve(&self, fail: bool) {
        self.state.write().await.fail_on_reserve = fail;
    }

    /// Reserves stock for the saga, returning the existing reservation if
    /// the saga already holds one.
    pub async fn reserve(
        &self,
        saga_id: &SagaId,
        order_id: &OrderId,
    ) -> Result<String, ProcessingError> {
        let mut state = self.state.write().await;

        if state.fail_on_reserve {
            return Err(ProcessingError::Failed(
                "inventory unavailable".to_string(),
            ));
        }

        if let Some((reservation_id, _)) = state.reservations.get(saga_id) {
            return Ok(reservation_id.clone());
        }

        state.next_id += 1;
        let reservation_id = format!("RES-{:04}", state.next_id);
        state
            .reservations
            .insert(saga_id.clone(), (reservation_id.clone(), order_id.clone()));
        state.arrival.push_back(saga_id.clone());
        while state.arrival.len() > state.capacity {
            if let Some(oldest) = state.arrival.pop_front() {
                state.reservations.remove(&oldest);
            }
        }
        Ok(reservation_id)
    }

    pub async fn reservation_count(&self) -> usize {
        self.state.read().await.reservations.len()
    }

    pub async fn reservation_for(&self, saga_id: &SagaId) -> Option<String> {
        self.state
            .read()
            .await
            .reservations
            .get(saga_id)
            .map(|(id, _)| id.clone())
    }
}

/// Reacts to `order.created` by reserving stock and emitting
/// `inventory.reserved`.
#[derive(Debug, Clone)]
pub struct InventoryStep {
    ledger: InventoryLedger,
    latency: Duration,
}

impl InventoryStep {
    pub fn new(ledger: InventoryLedger, latency: Duration) -> Self {
        Self { ledger, latency }
    }

    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }
}

#[async_trait]
impl StepHandler for InventoryStep {
    fn name(&self) -> &str {
        "reserve-inventory"
    }

    async fn process(&self, event: &Event) -> Result<Option<Event>, ProcessingError> {
        expect_event_type(event, ORDER_CREATED)?;
        tracing::info!(
            saga_id = %event.saga_id(),
            order_id = %event.order_id(),
            "reserving inventory"
        );

        // Stand-in for the call to a stock service.
        tokio::time::sleep(self.latency).await;
        let reservation_id = self.ledger.reserve(event.saga_id(), event.order_id()).await?;

        Ok(Some(event.successor(
            INVENTORY_RESERVED,
            INVENTORY_SERVICE,
            [
                ("inventory_status", "reserved".to_string()),
                ("reservation_id", reservation_id),
            ],
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_created(saga: &str) -> Event {
        Event::builder()
            .saga_id(saga)
            .event_type(ORDER_CREATED)
            .service("order-service")
            .order_id(format!("order-of-{saga}"))
            .payload_entry("amount", "99.99")
            .build()
    }

    #[tokio::test]
    async fn reservations_are_idempotent_per_saga() {
        let ledger = InventoryLedger::new();
        let saga = SagaId::from("S1");
        let order = OrderId::from("O1");

        let first = ledger.reserve(&saga, &order).await.unwrap();
        let again = ledger.reserve(&saga, &order).await.unwrap();
        let other = ledger
            .reserve(&SagaId::from("S2"), &OrderId::from("O2"))
            .await
            .unwrap();

        assert_eq!(first, "RES-0001");
        assert_eq!(again, first);
        assert_eq!(other, "RES-0002");
        assert_eq!(ledger.reservation_count().await, 2);
    }

    #[tokio::test]
    async fn oldest_reservation_is_forgotten_when_full() {
        let ledger = InventoryLedger::with_capacity(2);
        for saga in ["S1", "S2", "S3"] {
            ledger
                .reserve(&SagaId::from(saga), &OrderId::from("O1"))
                .await
                .unwrap();
        }

        assert_eq!(ledger.reservation_count().await, 2);
        assert_eq!(ledger.reservation_for(&SagaId::from("S1")).await, None);
        assert_eq!(
            ledger.reservation_for(&SagaId::from("S3")).await.as_deref(),
            Some("RES-0003")
        );
    }

    #[tokio::test]
    async fn injected_failure_is_transient() {
        let ledger = InventoryLedger::new();
        ledger.set_fail_on_reserve(true).await;

        let err = ledger
            .reserve(&SagaId::from("S1"), &OrderId::from("O1"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(ledger.reservation_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn emits_inventory_reserved() {
        let step = InventoryStep::new(InventoryLedger::new(), Duration::from_millis(500));
        let inbound = order_created("S1");

        let started = tokio::time::Instant::now();
        let successor = step.process(&inbound).await.unwrap().unwrap();

        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(successor.event_type(), INVENTORY_RESERVED);
        assert_eq!(successor.service(), INVENTORY_SERVICE);
        assert_eq!(successor.saga_id(), inbound.saga_id());
        assert_eq!(successor.order_id(), inbound.order_id());
        assert_eq!(successor.payload_value("inventory_status"), Some("reserved"));
        assert_eq!(successor.payload_value("reservation_id"), Some("RES-0001"));
        assert_eq!(
            step.ledger().reservation_for(inbound.saga_id()).await.as_deref(),
            Some("RES-0001")
        );
    }

    #[tokio::test]
    async fn rejects_other_event_types() {
        let step = InventoryStep::new(InventoryLedger::new(), Duration::ZERO);
        let wrong = Event::builder()
            .saga_id("S1")
            .event_type("shipping.scheduled")
            .order_id("O1")
            .build();

        let err = step.process(&wrong).await.unwrap_err();
        assert!(matches!(err, ProcessingError::Rejected(_)));
    }
}
