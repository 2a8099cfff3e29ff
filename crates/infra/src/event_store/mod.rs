//! Append-only event store boundary.
//!
//! Storage-agnostic abstraction for appending and loading event streams, with
//! an in-memory backend and, behind the `postgres` feature, a Postgres one.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
