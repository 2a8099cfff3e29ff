//! Event plumbing shared by the domain crates and infra.
//!
//! - [`Event`]: typed, versioned domain facts
//! - [`EventEnvelope`]: stream metadata around a payload
//! - [`EventBus`]: after-commit fan-out
//! - [`execute`]: inline decide + apply, used by domain tests

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Received, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
