//! Projection cursor/offset persistence.
//!
//! A cursor is the last sequence number a projection applied for one stream.
//! It makes projections idempotent (anything `<= cursor` is skipped) and lets
//! a rebuild start from scratch by clearing them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use stockbook_core::AggregateId;
use stockbook_events::EventEnvelope;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub trait ProjectionCursorStore: Send + Sync {
    fn get_cursor(&self, aggregate_id: AggregateId, projection_name: &str) -> Option<u64>;

    fn update_cursor(&self, aggregate_id: AggregateId, projection_name: &str, sequence_number: u64);

    fn clear_cursors(&self, projection_name: &str);
}

/// Process-local cursors; the default for every projection.
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    inner: RwLock<HashMap<(String, AggregateId), u64>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectionCursorStore for InMemoryCursorStore {
    fn get_cursor(&self, aggregate_id: AggregateId, projection_name: &str) -> Option<u64> {
        let map = self.inner.read().ok()?;
        map.get(&(projection_name.to_string(), aggregate_id)).copied()
    }

    fn update_cursor(&self, aggregate_id: AggregateId, projection_name: &str, sequence_number: u64) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((projection_name.to_string(), aggregate_id), sequence_number);
        }
    }

    fn clear_cursors(&self, projection_name: &str) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(name, _), _| name != projection_name);
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("failed to deserialize {aggregate_type} event: {message}")]
    Deserialize { aggregate_type: String, message: String },

    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Cursor bookkeeping shared by every projection.
#[derive(Clone)]
pub struct StreamCursors {
    projection_name: &'static str,
    store: Arc<dyn ProjectionCursorStore>,
}

impl core::fmt::Debug for StreamCursors {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamCursors")
            .field("projection_name", &self.projection_name)
            .finish_non_exhaustive()
    }
}

impl StreamCursors {
    pub fn new(projection_name: &'static str) -> Self {
        Self::with_store(projection_name, Arc::new(InMemoryCursorStore::new()))
    }

    pub fn with_store(projection_name: &'static str, store: Arc<dyn ProjectionCursorStore>) -> Self {
        Self {
            projection_name,
            store,
        }
    }

    pub fn projection_name(&self) -> &'static str {
        self.projection_name
    }

    /// Decide whether `envelope` is the next event to apply for its stream.
    ///
    /// `Ok(false)` means it was already applied. A gap after the first
    /// applied event is an error; the first event seen may start anywhere so
    /// a projection can attach to existing streams.
    pub fn should_apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, ProjectionError> {
        let seq = envelope.sequence_number();
        let last = self
            .store
            .get_cursor(envelope.aggregate_id(), self.projection_name)
            .unwrap_or(0);

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(false);
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        Ok(true)
    }

    pub fn advance(&self, envelope: &EventEnvelope<JsonValue>) {
        self.store
            .update_cursor(envelope.aggregate_id(), self.projection_name, envelope.sequence_number());
    }

    pub fn clear(&self) {
        self.store.clear_cursors(self.projection_name);
    }
}

/// Decode an envelope payload into a typed event.
pub(crate) fn decode<E: serde::de::DeserializeOwned>(
    envelope: &EventEnvelope<JsonValue>,
) -> Result<E, ProjectionError> {
    serde_json::from_value(envelope.payload().clone()).map_err(|e| ProjectionError::Deserialize {
        aggregate_type: envelope.aggregate_type().to_string(),
        message: e.to_string(),
    })
}

/// Reject events whose own id disagrees with the envelope's stream.
pub(crate) fn ensure_stream(
    envelope: &EventEnvelope<JsonValue>,
    event_aggregate_id: AggregateId,
) -> Result<(), ProjectionError> {
    if envelope.aggregate_id() != event_aggregate_id {
        return Err(ProjectionError::StreamMismatch(format!(
            "event id {event_aggregate_id} does not match envelope aggregate_id {}",
            envelope.aggregate_id()
        )));
    }
    Ok(())
}
