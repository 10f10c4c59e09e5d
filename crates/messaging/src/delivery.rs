//! Inbound deliveries and their acknowledgement.

use async_trait::async_trait;

use crate::error::AckError;

/// Broker-side half of a delivery: settles it one way or the other.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Confirms the delivery was handled.
    async fn ack(&self) -> Result<(), AckError>;

    /// Rejects the delivery. With `requeue` the broker delivers it again;
    /// without, the broker drops it or routes it to a dead-letter queue.
    async fn nack(&self, requeue: bool) -> Result<(), AckError>;
}

/// One message handed to a consumer.
///
/// `ack` and `nack` take the delivery by value, so a delivery is settled at
/// most once and never both acked and nacked.
pub struct Delivery {
    body: Vec<u8>,
    routing_key: String,
    redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        body: Vec<u8>,
        routing_key: impl Into<String>,
        redelivered: bool,
        acker: impl Acknowledger + 'static,
    ) -> Self {
        Self {
            body,
            routing_key: routing_key.into(),
            redelivered,
            acker: Box::new(acker),
        }
    }

    /// The raw message body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The routing key the message was published under.
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// True if the broker has delivered this message before.
    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    pub async fn ack(self) -> Result<(), AckError> {
        self.acker.ack().await
    }

    pub async fn nack(self, requeue: bool) -> Result<(), AckError> {
        self.acker.nack(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("routing_key", &self.routing_key)
            .field("redelivered", &self.redelivered)
            .field("body_len", &self.body.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingAcker {
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Acknowledger for RecordingAcker {
        async fn ack(&self) -> Result<(), AckError> {
            self.calls.lock().unwrap().push("ack".into());
            Ok(())
        }

        async fn nack(&self, requeue: bool) -> Result<(), AckError> {
            self.calls.lock().unwrap().push(format!("nack({requeue})"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn ack_is_forwarded_once() {
        let acker = RecordingAcker::default();
        let delivery = Delivery::new(b"{}".to_vec(), "order.created", false, acker.clone());

        assert_eq!(delivery.body(), b"{}");
        assert_eq!(delivery.routing_key(), "order.created");
        delivery.ack().await.unwrap();

        assert_eq!(*acker.calls.lock().unwrap(), vec!["ack".to_string()]);
    }

    #[tokio::test]
    async fn nack_carries_requeue_flag() {
        let acker = RecordingAcker::default();
        Delivery::new(vec![], "k", true, acker.clone())
            .nack(true)
            .await
            .unwrap();
        Delivery::new(vec![], "k", false, acker.clone())
            .nack(false)
            .await
            .unwrap();

        assert_eq!(
            *acker.calls.lock().unwrap(),
            vec!["nack(true)".to_string(), "nack(false)".to_string()]
        );
    }

    #[test]
    fn debug_omits_body() {
        let delivery = Delivery::new(vec![1, 2, 3], "k", false, RecordingAcker::default());
        let rendered = format!("{delivery:?}");
        assert!(rendered.contains("body_len: 3"));
    }
}
