//! Bounded record of inbound events a step has already completed.

use std::collections::{HashSet, VecDeque};

use common::SagaId;
use messaging::Event;

type Key = (SagaId, String);

/// Remembers the `(saga_id, event_type)` of completed inbound events.
///
/// Once full, the oldest key is forgotten first.
#[derive(Debug)]
pub struct ProcessedLog {
    capacity: usize,
    seen: HashSet<Key>,
    order: VecDeque<Key>,
}

impl ProcessedLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    fn key(event: &Event) -> Key {
        (event.saga_id().clone(), event.event_type().to_string())
    }

    pub fn contains(&self, event: &Event) -> bool {
        self.seen.contains(&Self::key(event))
    }

    /// Marks `event` as completed.
    pub fn record(&mut self, event: &Event) {
        if self.capacity == 0 {
            return;
        }
        let key = Self::key(event);
        if !self.seen.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ProcessedLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}
