//! Per-service saga counters.
//!
//! Every increment goes to the installed `metrics` recorder under the
//! service label and to a local total, so tests and health checks can read
//! the counts without scraping the exporter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::Counter;

pub const EVENTS_PUBLISHED: &str = "saga_events_published_total";
pub const EVENTS_CONSUMED: &str = "saga_events_consumed_total";
pub const EVENTS_FAILED: &str = "saga_events_failed_total";

/// Point-in-time copy of a service's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub published: u64,
    pub consumed: u64,
    pub failed: u64,
}

struct Counters {
    service: String,
    published: Counter,
    consumed: Counter,
    failed: Counter,
    published_total: AtomicU64,
    consumed_total: AtomicU64,
    failed_total: AtomicU64,
}

/// Counters for one saga participant, cheap to clone and share.
#[derive(Clone)]
pub struct ServiceMetrics {
    inner: Arc<Counters>,
}

impl ServiceMetrics {
    /// Registers the counters for `service` with the current recorder.
    pub fn new(service: impl Into<String>) -> Self {
        let service = service.into();

        metrics::describe_counter!(EVENTS_PUBLISHED, "Events successfully published");
        metrics::describe_counter!(EVENTS_CONSUMED, "Events received and decoded");
        metrics::describe_counter!(EVENTS_FAILED, "Events that failed processing or publishing");

        Self {
            inner: Arc::new(Counters {
                published: metrics::counter!(EVENTS_PUBLISHED, "service" => service.clone()),
                consumed: metrics::counter!(EVENTS_CONSUMED, "service" => service.clone()),
                failed: metrics::counter!(EVENTS_FAILED, "service" => service.clone()),
                service,
                published_total: AtomicU64::new(0),
                consumed_total: AtomicU64::new(0),
                failed_total: AtomicU64::new(0),
            }),
        }
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    pub fn record_published(&self) {
        self.inner.published.increment(1);
        self.inner.published_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_consumed(&self) {
        self.inner.consumed.increment(1);
        self.inner.consumed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.inner.failed.increment(1);
        self.inner.failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            published: self.inner.published_total.load(Ordering::Relaxed),
            consumed: self.inner.consumed_total.load(Ordering::Relaxed),
            failed: self.inner.failed_total.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ServiceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMetrics")
            .field("service", &self.inner.service)
            .field("totals", &self.snapshot())
            .finish()
    }
}
