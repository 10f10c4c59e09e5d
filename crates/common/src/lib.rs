//! Shared identifier types for the saga services.

pub mod types;

pub use types::{OrderId, SagaId};
