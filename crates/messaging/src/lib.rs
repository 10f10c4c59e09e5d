//! Saga event wire format and the topic-exchange event bus.
//!
//! - [`Event`]: the message every saga step consumes and produces
//! - [`EventBus`]: publish/consume over a shared topic exchange
//! - [`AmqpBus`]: RabbitMQ implementation
//! - [`InMemoryBus`]: in-process implementation for tests and local runs
//! - [`Delivery`]: one inbound message, settled by exactly one ack or nack

pub mod amqp;
pub mod bus;
pub mod delivery;
pub mod error;
pub mod event;
pub mod memory;
pub mod retry;
pub mod routing;

pub use amqp::{AmqpBus, AmqpConfig};
pub use bus::{DeliveryStream, EXCHANGE, EventBus};
pub use delivery::{Acknowledger, Delivery};
pub use error::{AckError, ConnectError, ConsumeError, DecodeError, PublishError};
pub use event::{CONTENT_TYPE, Event, EventBuilder};
pub use memory::{DeadLetter, InMemoryBus};
pub use retry::connect_with_retry;
pub use routing::topic_matches;
