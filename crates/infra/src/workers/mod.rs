//! Background consumers of the event bus.

pub mod bus_worker;

pub use bus_worker::{log_activity, BusWorker, WorkerHandle};
