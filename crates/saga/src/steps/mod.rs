//! The order saga's participants.

pub mod completion;
pub mod inventory;
pub mod shipping;

pub use completion::SagaCompletion;
pub use inventory::{InventoryLedger, InventoryStep};
pub use shipping::{ShipmentSchedule, ShippingStep};

use messaging::Event;

use crate::error::ProcessingError;

/// Sagas a step's in-memory store remembers unless told otherwise.
pub const DEFAULT_RETAINED_SAGAS: usize = 10_000;

/// Rejects events of any type other than `expected`.
pub(crate) fn expect_event_type(event: &Event, expected: &str) -> Result<(), ProcessingError> {
    if event.event_type() == expected {
        Ok(())
    } else {
        Err(ProcessingError::Rejected(format!(
            "expected '{expected}', got '{}'",
            event.event_type()
        )))
    }
}
