//! Topics, services and queue names of the order saga.

pub const ORDER_CREATED: &str = "order.created";
pub const INVENTORY_RESERVED: &str = "inventory.reserved";
pub const SHIPPING_SCHEDULED: &str = "shipping.scheduled";

pub const ORDER_SERVICE: &str = "order-service";
pub const INVENTORY_SERVICE: &str = "inventory-service";
pub const SHIPPING_SERVICE: &str = "shipping-service";

/// Durable queue owned by `service` for events published under `topic`.
///
/// `queue_name("inventory-service", "order.created")` is
/// `inventory-service.order-created`.
pub fn queue_name(service: &str, topic: &str) -> String {
    format!("{service}.{}", topic.replace('.', "-"))
}

/// A service's queue and the routing key it is bound under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub queue: String,
    pub routing_key: String,
}

impl Subscription {
    pub fn new(service: &str, topic: &str) -> Self {
        Self {
            queue: queue_name(service, topic),
            routing_key: topic.to_string(),
        }
    }
}
