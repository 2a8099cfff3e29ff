//! Rebuilding read models from the event log.

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::event_store::{EventStore, EventStoreError};
use crate::projections::{ProjectionError, Projections};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("projection error at global position {position}: {source}")]
    Projection {
        position: u64,
        #[source]
        source: ProjectionError,
    },
}

/// Outcome of a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub events: u64,
    pub streams: u64,
}

/// Clear every projection and replay the whole log in commit order.
pub fn rebuild<S: EventStore + ?Sized>(store: &S, projections: &Projections) -> Result<ReplayReport, ReplayError> {
    let events = store.load_all()?;
    projections.clear();

    let mut streams = std::collections::HashSet::new();
    for stored in &events {
        projections
            .apply(&stored.to_envelope())
            .map_err(|source| ReplayError::Projection {
                position: stored.global_position,
                source,
            })?;
        streams.insert(stored.aggregate_id);
    }

    let report = ReplayReport {
        events: events.len() as u64,
        streams: streams.len() as u64,
    };
    info!(events = report.events, streams = report.streams, "read models rebuilt");
    Ok(report)
}
