//! Persistence for the commerce aggregates.
//!
//! Aggregates are stored as whole documents guarded by their version; every
//! save also appends the aggregate's new domain events to an outbox log in the
//! same unit of work.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::{AggregateId, Version};
pub use error::{Result, StoreError};
pub use event::{EventEnvelope, EventId, build_envelopes};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{CouponRepository, EventLog, OrderRepository, PaymentRepository, Store};
