//! Projection implementations (read model builders).
//!
//! Projections consume committed events and build query-optimized read
//! models. All projections are:
//! - **Rebuildable**: can be reconstructed from the event log
//! - **Idempotent**: redelivered events (`seq <= cursor`) are skipped

use serde_json::Value as JsonValue;

use stockbook_events::EventEnvelope;

use crate::event_store::StoredEvent;
use crate::read_model::InMemoryReadStore;

pub mod catalog;
pub mod cursor_store;
pub mod movements;
pub mod parties;
pub mod replay;
pub mod stock_levels;
pub mod users;
pub mod warehouses;

pub use catalog::{
    CategoriesProjection, CategoryReadModel, PackagingTypeReadModel, PackagingTypesProjection,
    ProductReadModel, ProductsProjection,
};
pub use cursor_store::{InMemoryCursorStore, ProjectionError, StreamCursors};
pub use movements::{MovementFilter, MovementReadModel, MovementsProjection};
pub use parties::{PartiesProjection, PartyReadModel};
pub use replay::{rebuild, ReplayError, ReplayReport};
pub use stock_levels::{LedgerLine, LedgerSource, StockLevel, StockLevelsProjection};
pub use users::{UserReadModel, UsersProjection};
pub use warehouses::{WarehouseReadModel, WarehousesProjection};

/// A read model builder fed with event envelopes.
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Apply one envelope; envelopes of other streams are ignored.
    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    /// Drop all state and cursors (before a rebuild).
    fn clear(&self);
}

/// Every read model of the back office.
#[derive(Debug)]
pub struct Projections {
    pub categories: CategoriesProjection,
    pub packaging_types: PackagingTypesProjection,
    pub products: ProductsProjection,
    pub parties: PartiesProjection,
    pub warehouses: WarehousesProjection,
    pub movements: MovementsProjection,
    pub stock: StockLevelsProjection,
    pub users: UsersProjection,
}

impl Default for Projections {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Projections {
    pub fn in_memory() -> Self {
        Self {
            categories: CategoriesProjection::new(InMemoryReadStore::new()),
            packaging_types: PackagingTypesProjection::new(InMemoryReadStore::new()),
            products: ProductsProjection::new(InMemoryReadStore::new()),
            parties: PartiesProjection::new(InMemoryReadStore::new()),
            warehouses: WarehousesProjection::new(InMemoryReadStore::new()),
            movements: MovementsProjection::new(InMemoryReadStore::new()),
            stock: StockLevelsProjection::new(InMemoryReadStore::new(), InMemoryReadStore::new()),
            users: UsersProjection::new(InMemoryReadStore::new()),
        }
    }

    fn all(&self) -> [&dyn Projection; 8] {
        [
            &self.categories,
            &self.packaging_types,
            &self.products,
            &self.parties,
            &self.warehouses,
            &self.movements,
            &self.stock,
            &self.users,
        ]
    }

    /// Route one envelope to every projection.
    pub fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        for projection in self.all() {
            if let Err(e) = projection.apply_envelope(envelope) {
                tracing::warn!(
                    projection = projection.name(),
                    aggregate_type = envelope.aggregate_type(),
                    sequence_number = envelope.sequence_number(),
                    error = %e,
                    "projection apply failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Apply freshly committed events (read-your-writes after a dispatch).
    pub fn apply_committed(&self, committed: &[StoredEvent]) -> Result<(), ProjectionError> {
        for stored in committed {
            self.apply(&stored.to_envelope())?;
        }
        Ok(())
    }

    pub fn clear(&self) {
        for projection in self.all() {
            projection.clear();
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use serde::Serialize;
    use serde_json::Value as JsonValue;
    use uuid::Uuid;

    use stockbook_core::AggregateId;
    use stockbook_events::{Event, EventEnvelope};

    pub(crate) fn envelope<E: Event + Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: &str,
        seq: u64,
        event: &E,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            aggregate_id,
            aggregate_type,
            seq,
            event.event_type(),
            Utc::now(),
            serde_json::to_value(event).unwrap(),
        )
    }
}
