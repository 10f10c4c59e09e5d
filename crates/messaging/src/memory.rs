//! In-process event bus.
//!
//! Behaves like a topic exchange with durable queues: each queue receives a
//! copy of every message whose routing key matches one of its bindings,
//! consumers sharing a queue split its messages, requeued messages come back
//! flagged as redelivered and rejected messages land in a dead-letter list.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tracing::error;

use crate::bus::{DeliveryStream, EventBus};
use crate::delivery::{Acknowledger, Delivery};
use crate::error::{AckError, ConsumeError, PublishError};
use crate::event::Event;
use crate::routing::topic_matches;

/// A message rejected without requeue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub queue: String,
    pub routing_key: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Message {
    routing_key: String,
    body: Vec<u8>,
    redelivered: bool,
}

struct Queue {
    bindings: Vec<String>,
    tx: mpsc::UnboundedSender<Message>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Message>>>,
}

impl Queue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            bindings: Vec::new(),
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

#[derive(Default)]
struct State {
    queues: HashMap<String, Queue>,
    published: Vec<(String, Event)>,
    dead_letters: Vec<DeadLetter>,
    fail_on_publish: bool,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    closed: AtomicBool,
    acked: AtomicUsize,
    requeued: AtomicUsize,
    unsettled: AtomicUsize,
}

impl Inner {
    fn route(&self, state: &State, message: Message) {
        for queue in state.queues.values() {
            if queue
                .bindings
                .iter()
                .any(|pattern| topic_matches(pattern, &message.routing_key))
            {
                let _ = queue.tx.send(message.clone());
            }
        }
    }
}

/// Event bus backed by in-process channels.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following publish fail with a channel error.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        self.inner.state.lock().await.fail_on_publish = fail;
    }

    /// Routes raw bytes through the exchange, bypassing event encoding.
    pub async fn publish_raw(&self, routing_key: &str, body: Vec<u8>) {
        let state = self.inner.state.lock().await;
        self.inner.route(
            &state,
            Message {
                routing_key: routing_key.to_string(),
                body,
                redelivered: false,
            },
        );
    }

    /// Successfully published events with their routing keys, oldest first.
    pub async fn published(&self) -> Vec<(String, Event)> {
        self.inner.state.lock().await.published.clone()
    }

    pub async fn published_count(&self) -> usize {
        self.inner.state.lock().await.published.len()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.state.lock().await.dead_letters.clone()
    }

    /// Whether `queue` exists and is bound under `routing_key`.
    pub async fn is_bound(&self, queue: &str, routing_key: &str) -> bool {
        self.inner
            .state
            .lock()
            .await
            .queues
            .get(queue)
            .is_some_and(|q| q.bindings.iter().any(|b| b == routing_key))
    }

    pub fn acked_count(&self) -> usize {
        self.inner.acked.load(Ordering::SeqCst)
    }

    pub fn requeued_count(&self) -> usize {
        self.inner.requeued.load(Ordering::SeqCst)
    }

    /// Deliveries dropped without an ack or nack.
    pub fn unsettled_count(&self) -> usize {
        self.inner.unsettled.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, routing_key: &str, event: &Event) -> Result<(), PublishError> {
        if self.is_closed() {
            return Err(PublishError::Closed);
        }
        let body = event.encode().map_err(PublishError::Encode)?;

        let mut state = self.inner.state.lock().await;
        if state.fail_on_publish {
            return Err(PublishError::Channel("injected publish failure".to_string()));
        }

        self.inner.route(
            &state,
            Message {
                routing_key: routing_key.to_string(),
                body,
                redelivered: false,
            },
        );
        state
            .published
            .push((routing_key.to_string(), event.clone()));
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        routing_key: &str,
    ) -> Result<DeliveryStream, ConsumeError> {
        if self.is_closed() {
            return Err(ConsumeError::Closed);
        }

        let rx = {
            let mut state = self.inner.state.lock().await;
            let entry = state
                .queues
                .entry(queue.to_string())
                .or_insert_with(Queue::new);
            if !entry.bindings.iter().any(|b| b == routing_key) {
                entry.bindings.push(routing_key.to_string());
            }
            entry.rx.clone()
        };

        let stream = futures_util::stream::unfold(
            (self.inner.clone(), queue.to_string(), rx),
            |(inner, queue, rx)| async move {
                let message = rx.lock().await.recv().await?;
                if inner.closed.load(Ordering::SeqCst) {
                    return None;
                }
                let delivery = Delivery::new(
                    message.body.clone(),
                    message.routing_key.clone(),
                    message.redelivered,
                    MemoryAcker::new(inner.clone(), queue.clone(), message),
                );
                Some((Ok(delivery), (inner, queue, rx)))
            },
        );

        Ok(stream.boxed())
    }

    async fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            // Dropping the senders ends every consumer stream.
            self.inner.state.lock().await.queues.clear();
        }
    }
}

struct MemoryAcker {
    inner: Arc<Inner>,
    queue: String,
    message: Message,
    settled: AtomicBool,
}

impl MemoryAcker {
    fn new(inner: Arc<Inner>, queue: String, message: Message) -> Self {
        Self {
            inner,
            queue,
            message,
            settled: AtomicBool::new(false),
        }
    }

    fn settle(&self) -> Result<(), AckError> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(AckError("delivery already settled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<(), AckError> {
        self.settle()?;
        self.inner.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), AckError> {
        self.settle()?;
        let mut state = self.inner.state.lock().await;
        if requeue {
            self.inner.requeued.fetch_add(1, Ordering::SeqCst);
            if let Some(queue) = state.queues.get(&self.queue) {
                let _ = queue.tx.send(Message {
                    redelivered: true,
                    ..self.message.clone()
                });
            }
        } else {
            state.dead_letters.push(DeadLetter {
                queue: self.queue.clone(),
                routing_key: self.message.routing_key.clone(),
                body: self.message.body.clone(),
            });
        }
        Ok(())
    }
}

impl Drop for MemoryAcker {
    fn drop(&mut self) {
        if !self.settled.load(Ordering::SeqCst) {
            self.inner.unsettled.fetch_add(1, Ordering::SeqCst);
            error!(
                queue = %self.queue,
                routing_key = %self.message.routing_key,
                "delivery dropped without ack or nack"
            );
        }
    }
}
