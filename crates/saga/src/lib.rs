//! Choreographed order saga.
//!
//! Each participating service reacts to one topic on the shared exchange,
//! does its piece of work and publishes the event the next service reacts
//! to. Nothing coordinates the saga centrally:
//!
//! 1. order-service publishes `order.created`
//! 2. inventory-service reserves stock, publishes `inventory.reserved`
//! 3. shipping-service schedules a shipment, publishes `shipping.scheduled`
//! 4. order-service logs the saga as complete

pub mod dedupe;
pub mod error;
pub mod handler;
pub mod initiator;
pub mod metrics;
pub mod processor;
pub mod steps;
pub mod topology;

pub use dedupe::ProcessedLog;
pub use error::{ProcessingError, SagaError};
pub use handler::StepHandler;
pub use initiator::OrderInitiator;
pub use metrics::{MetricsSnapshot, ServiceMetrics};
pub use processor::{DeliveryOutcome, ProcessorConfig, StepProcessor};
pub use steps::{InventoryLedger, InventoryStep, SagaCompletion, ShipmentSchedule, ShippingStep};
pub use topology::Subscription;
