//! Meridian event store implementations.
//!
//! `PgEventStore` is the production store; `InMemoryEventStore` backs tests
//! and the worker's in-memory mode.

pub mod memory_event_store;
pub mod pg_event_store;
pub mod schema;

pub use memory_event_store::InMemoryEventStore;
pub use pg_event_store::PgEventStore;
