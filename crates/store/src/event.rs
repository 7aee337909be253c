use std::collections::HashMap;

use chrono::{DateTime, Utc};
use domain::{Aggregate, DomainEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AggregateId, Version};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A domain event as written to the outbox log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,

    /// e.g. "OrderCreated", "PaymentCompleted".
    pub event_type: String,

    pub aggregate_id: AggregateId,

    /// e.g. "Order", "Payment".
    pub aggregate_type: String,

    /// The aggregate's version once this event is applied.
    pub version: Version,

    pub timestamp: DateTime<Utc>,

    /// The tagged event as JSON.
    pub payload: serde_json::Value,

    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    /// Wraps one event of `A` at `version`.
    pub fn for_event<A: Aggregate>(
        aggregate_id: AggregateId,
        version: Version,
        event: &A::Event,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: EventId::new(),
            event_type: event.event_type().to_string(),
            aggregate_id,
            aggregate_type: A::aggregate_type().to_string(),
            version,
            timestamp: Utc::now(),
            payload: serde_json::to_value(event)?,
            metadata: HashMap::new(),
        })
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Decodes the payload back into the concrete event type.
    pub fn decode<E: DomainEvent>(&self) -> Result<E, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Builds envelopes for `events`, numbered from the aggregate's loaded version.
pub fn build_envelopes<A: Aggregate>(
    aggregate: &A,
    events: &[A::Event],
) -> Result<Vec<EventEnvelope>, serde_json::Error> {
    let aggregate_id = aggregate.aggregate_id();
    let mut version = aggregate.version();
    events
        .iter()
        .map(|event| {
            version = version.next();
            EventEnvelope::for_event::<A>(aggregate_id, version, event)
        })
        .collect()
}
