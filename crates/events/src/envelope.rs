//! Committed-event envelope handed to projections and the bus.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockbook_core::AggregateId;

/// One committed event at its place in a stream.
///
/// `(aggregate_id, sequence_number)` is unique and numbering starts at 1, so
/// read models keep the last number they applied per stream and skip
/// anything at or below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    aggregate_type: String,
    aggregate_id: AggregateId,
    sequence_number: u64,
    event_type: String,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            aggregate_type: aggregate_type.into(),
            aggregate_id,
            sequence_number,
            event_type: event_type.into(),
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// Stream family, e.g. `inventory.movement`.
    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Serialized event name, e.g. `inventory.movement.completed`.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}

/// `aggregate_type/aggregate_id#sequence_number`, for log lines.
impl<E> fmt::Display for EventEnvelope<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.aggregate_type, self.aggregate_id, self.sequence_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_the_stream_position() {
        let id = AggregateId::new();
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            id,
            "inventory.movement",
            3,
            "inventory.movement.completed",
            Utc::now(),
            (),
        );
        assert_eq!(envelope.to_string(), format!("inventory.movement/{id}#3"));
    }
}
