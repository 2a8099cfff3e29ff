use std::collections::HashMap;
use std::sync::RwLock;

use stockbook_core::{AggregateId, ExpectedVersion};

use super::r#trait::{validate_batch, EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Default)]
struct Log {
    /// Commit order across every stream.
    all: Vec<StoredEvent>,
    /// Per-stream indexes into `all`.
    streams: HashMap<AggregateId, Vec<usize>>,
}

/// In-memory append-only event store.
///
/// Used by tests and by the server when no `DATABASE_URL` is configured.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<Log>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.log.read().map(|l| l.all.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> EventStoreError {
    EventStoreError::Backend("lock poisoned".to_string())
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let (aggregate_id, aggregate_type) = validate_batch(&events)?;

        let mut log = self.log.write().map_err(|_| poisoned())?;
        let Log { all, streams } = &mut *log;

        let indexes = streams.entry(aggregate_id).or_default();
        let current = indexes
            .last()
            .map(|&i| all[i].sequence_number)
            .unwrap_or(0);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        // Enforce aggregate type stability across the stream.
        if let Some(&first) = indexes.first() {
            if all[first].aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    all[first].aggregate_type, aggregate_type
                )));
            }
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                global_position: all.len() as u64 + 1,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            indexes.push(all.len());
            all.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self.log.read().map_err(|_| poisoned())?;
        Ok(log
            .streams
            .get(&aggregate_id)
            .map(|idx| idx.iter().map(|&i| log.all[i].clone()).collect())
            .unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self.log.read().map_err(|_| poisoned())?;
        Ok(log.all.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "test.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({}),
        }
    }

    #[test]
    fn assigns_stream_and_global_positions() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        store
            .append(vec![event(a, "t"), event(a, "t")], ExpectedVersion::Exact(0))
            .unwrap();
        let b1 = store.append(vec![event(b, "t")], ExpectedVersion::Exact(0)).unwrap();
        let a3 = store.append(vec![event(a, "t")], ExpectedVersion::Exact(2)).unwrap();

        assert_eq!(b1[0].sequence_number, 1);
        assert_eq!(b1[0].global_position, 3);
        assert_eq!(a3[0].sequence_number, 3);
        assert_eq!(a3[0].global_position, 4);

        let stream: Vec<u64> = store.load_stream(a).unwrap().iter().map(|e| e.sequence_number).collect();
        assert_eq!(stream, vec![1, 2, 3]);
        assert_eq!(store.load_all().unwrap().len(), 4);
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        store.append(vec![event(a, "t")], ExpectedVersion::Exact(0)).unwrap();

        let err = store.append(vec![event(a, "t")], ExpectedVersion::Exact(0)).unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn mixed_batches_are_rejected() {
        let store = InMemoryEventStore::new();
        let err = store
            .append(
                vec![event(AggregateId::new(), "t"), event(AggregateId::new(), "t")],
                ExpectedVersion::Any,
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn stream_type_is_stable() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        store.append(vec![event(a, "catalog.product")], ExpectedVersion::Exact(0)).unwrap();
        let err = store
            .append(vec![event(a, "inventory.movement")], ExpectedVersion::Exact(1))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }
}
