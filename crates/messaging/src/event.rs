//! Saga event wire format.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{OrderId, SagaId};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Content type of an encoded [`Event`].
pub const CONTENT_TYPE: &str = "application/json";

/// The message shared by every step of the saga.
///
/// Events are immutable: a step never edits the event it received, it builds
/// a new one with [`Event::successor`]. `saga_id` and `order_id` are fixed at
/// saga start and carried verbatim into every successor.
///
/// The payload is an ordered map so that equal events encode to identical
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireEvent")]
pub struct Event {
    saga_id: SagaId,
    event_type: String,
    service: String,
    order_id: OrderId,
    payload: BTreeMap<String, String>,
    occurred_at: DateTime<Utc>,
    correlation_id: String,
}

impl Event {
    /// Creates a new event builder.
    pub fn builder() -> EventBuilder {
        EventBuilder::default()
    }

    /// Creates the first event of a new saga.
    ///
    /// Assigns a fresh saga ID and order ID; the correlation ID starts out
    /// equal to the saga ID.
    pub fn initiate<K, V>(
        event_type: impl Into<String>,
        service: impl Into<String>,
        payload: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let saga_id = SagaId::new();
        Self {
            correlation_id: saga_id.to_string(),
            saga_id,
            event_type: event_type.into(),
            service: service.into(),
            order_id: OrderId::new(),
            payload: collect_payload(payload),
            occurred_at: Utc::now(),
        }
    }

    /// Builds the event the next step publishes in reaction to this one.
    ///
    /// Saga ID, order ID and correlation ID are copied unchanged. The
    /// timestamp never goes backwards relative to this event, so timestamps
    /// stay non-decreasing along a saga even if producer clocks disagree.
    pub fn successor<K, V>(
        &self,
        event_type: impl Into<String>,
        service: impl Into<String>,
        payload: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            saga_id: self.saga_id.clone(),
            event_type: event_type.into(),
            service: service.into(),
            order_id: self.order_id.clone(),
            payload: collect_payload(payload),
            occurred_at: Utc::now().max(self.occurred_at),
            correlation_id: self.correlation_id.clone(),
        }
    }

    /// Serializes the event into its canonical wire form.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses an event from its wire form.
    ///
    /// Unknown fields are ignored. `saga_id`, `event_type` and `order_id`
    /// must be present and non-empty; anything else is an error rather than
    /// a half-filled event.
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let wire: WireEvent = serde_json::from_slice(raw)?;
        Self::try_from(wire)
    }

    pub fn saga_id(&self) -> &SagaId {
        &self.saga_id
    }

    /// The step that produced this event; also its routing key.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn payload(&self) -> &BTreeMap<String, String> {
        &self.payload
    }

    /// Returns a single payload value.
    pub fn payload_value(&self, key: &str) -> Option<&str> {
        self.payload.get(key).map(String::as_str)
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

fn collect_payload<K, V>(payload: impl IntoIterator<Item = (K, V)>) -> BTreeMap<String, String>
where
    K: Into<String>,
    V: Into<String>,
{
    payload
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Lenient decoding target. Every field is optional here; [`Event`] decides
/// which absences are fatal. `null` is accepted wherever a field may be
/// absent, since some producers encode an empty map that way.
#[derive(Debug, Deserialize)]
struct WireEvent {
    saga_id: Option<SagaId>,
    event_type: Option<String>,
    service: Option<String>,
    order_id: Option<OrderId>,
    payload: Option<BTreeMap<String, String>>,
    occurred_at: Option<DateTime<Utc>>,
    correlation_id: Option<String>,
}

impl TryFrom<WireEvent> for Event {
    type Error = DecodeError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let saga_id = wire
            .saga_id
            .filter(|id| !id.is_empty())
            .ok_or(DecodeError::MissingField("saga_id"))?;
        let event_type = wire
            .event_type
            .filter(|t| !t.is_empty())
            .ok_or(DecodeError::MissingField("event_type"))?;
        let order_id = wire
            .order_id
            .filter(|id| !id.is_empty())
            .ok_or(DecodeError::MissingField("order_id"))?;

        Ok(Self {
            saga_id,
            event_type,
            service: wire.service.unwrap_or_default(),
            order_id,
            payload: wire.payload.unwrap_or_default(),
            occurred_at: wire.occurred_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            correlation_id: wire.correlation_id.unwrap_or_default(),
        })
    }
}

/// Builder for constructing events with explicit identifiers.
#[derive(Debug, Default)]
pub struct EventBuilder {
    saga_id: Option<SagaId>,
    event_type: Option<String>,
    service: Option<String>,
    order_id: Option<OrderId>,
    payload: BTreeMap<String, String>,
    occurred_at: Option<DateTime<Utc>>,
    correlation_id: Option<String>,
}

impl EventBuilder {
    pub fn saga_id(mut self, id: impl Into<SagaId>) -> Self {
        self.saga_id = Some(id.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn order_id(mut self, id: impl Into<OrderId>) -> Self {
        self.order_id = Some(id.into());
        self
    }

    /// Adds a payload entry.
    pub fn payload_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Sets the correlation ID. If not set, the saga ID is used.
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Builds the event.
    ///
    /// # Panics
    ///
    /// Panics if saga_id, event_type or order_id are not set.
    pub fn build(self) -> Event {
        self.try_build()
            .expect("saga_id, event_type and order_id are required")
    }

    /// Tries to build the event, returning None if required fields are missing.
    pub fn try_build(self) -> Option<Event> {
        let saga_id = self.saga_id?;
        Some(Event {
            correlation_id: self.correlation_id.unwrap_or_else(|| saga_id.to_string()),
            saga_id,
            event_type: self.event_type?,
            service: self.service.unwrap_or_default(),
            order_id: self.order_id?,
            payload: self.payload,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
        })
    }
}
