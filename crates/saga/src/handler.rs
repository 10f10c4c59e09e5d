//! The domain work of a saga step.

use async_trait::async_trait;
use messaging::Event;

use crate::error::ProcessingError;

/// Turns an inbound event into the event the next step reacts to.
///
/// Returning `Ok(None)` marks a terminal step: the inbound event is
/// acknowledged and nothing is published.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn process(&self, event: &Event) -> Result<Option<Event>, ProcessingError>;
}
