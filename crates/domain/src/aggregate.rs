//! Core aggregate and domain event traits.

use common::{AggregateId, Version};
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name written to the event log.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates.
///
/// An aggregate is a cluster of domain objects treated as a single
/// consistency boundary. Its state is persisted as a whole, and every change
/// is expressed as events so the store can record what happened alongside the
/// new state.
///
/// Aggregates:
/// - Validate commands against current state and return events (no mutation)
/// - Apply events to update state (pure, deterministic, infallible)
/// - Carry the version they were loaded at, for optimistic concurrency
pub trait Aggregate: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors its commands can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's identifier.
    fn aggregate_id(&self) -> AggregateId;

    /// Returns the version the aggregate was loaded at.
    ///
    /// A freshly created aggregate that has never been saved is at version 0.
    fn version(&self) -> Version;

    /// Sets the aggregate version.
    ///
    /// Called by repositories after loading and after a successful save.
    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// This method must be pure and deterministic, and must not fail:
    /// events represent facts that have already been accepted.
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }

    /// Runs a command against the current state and applies the resulting events.
    ///
    /// On error the aggregate is left untouched. The applied events are
    /// returned so the caller can hand them to a repository.
    fn execute<F>(&mut self, command: F) -> Result<Vec<Self::Event>, Self::Error>
    where
        F: FnOnce(&Self) -> Result<Vec<Self::Event>, Self::Error>,
    {
        let events = command(self)?;
        for event in &events {
            self.apply(event.clone());
        }
        Ok(events)
    }
}
