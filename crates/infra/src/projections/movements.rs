//! Stock movement documents with their lines.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use stockbook_auth::UserId;
use stockbook_catalog::ProductId;
use stockbook_events::EventEnvelope;
use stockbook_inventory::{
    MovementEvent, MovementId, MovementItem, MovementStatus, MovementType, WarehouseId,
};
use stockbook_parties::PartyId;

use crate::projections::cursor_store::{decode, ensure_stream, ProjectionError, StreamCursors};
use crate::projections::Projection;
use crate::read_model::{InMemoryReadStore, ReadStore};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementReadModel {
    pub movement_id: MovementId,
    pub reference: String,
    pub movement_type: MovementType,
    pub status: MovementStatus,
    pub from_warehouse_id: Option<WarehouseId>,
    pub to_warehouse_id: Option<WarehouseId>,
    pub supplier_id: Option<PartyId>,
    pub customer_id: Option<PartyId>,
    pub created_by: UserId,
    pub notes: Option<String>,
    pub moved_at: DateTime<Utc>,
    pub items: Vec<MovementItem>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl MovementReadModel {
    pub fn party_id(&self) -> Option<PartyId> {
        self.supplier_id.or(self.customer_id)
    }

    /// Sum of `quantity × unit price` over lines that carry a price.
    pub fn priced_total(&self) -> u64 {
        self.items
            .iter()
            .filter_map(|i| i.unit_price.map(|p| i.quantity_in_base_unit.saturating_mul(p)))
            .fold(0u64, u64::saturating_add)
    }
}

/// Optional list filters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MovementFilter {
    pub movement_type: Option<MovementType>,
    pub status: Option<MovementStatus>,
    pub warehouse_id: Option<WarehouseId>,
}

#[derive(Debug)]
pub struct MovementsProjection<S = InMemoryReadStore<MovementId, MovementReadModel>> {
    store: S,
    cursors: StreamCursors,
}

impl<S> MovementsProjection<S>
where
    S: ReadStore<MovementId, MovementReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new("inventory.movements"),
        }
    }

    pub fn get(&self, id: &MovementId) -> Option<MovementReadModel> {
        self.store.get(id)
    }

    /// Newest first.
    pub fn list(&self, filter: MovementFilter) -> Vec<MovementReadModel> {
        let mut all: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|m| filter.movement_type.is_none_or(|t| m.movement_type == t))
            .filter(|m| filter.status.is_none_or(|s| m.status == s))
            .filter(|m| {
                filter
                    .warehouse_id
                    .is_none_or(|w| m.from_warehouse_id == Some(w) || m.to_warehouse_id == Some(w))
            })
            .collect();
        all.sort_by(|a, b| b.moved_at.cmp(&a.moved_at).then_with(|| b.reference.cmp(&a.reference)));
        all
    }

    pub fn find_by_reference(&self, reference: &str) -> Option<MovementReadModel> {
        let wanted = reference.trim();
        self.store.list().into_iter().find(|m| m.reference.eq_ignore_ascii_case(wanted))
    }

    pub fn references_warehouse(&self, id: WarehouseId) -> bool {
        self.store
            .list()
            .iter()
            .any(|m| m.from_warehouse_id == Some(id) || m.to_warehouse_id == Some(id))
    }

    pub fn references_party(&self, id: PartyId) -> bool {
        self.store.list().iter().any(|m| m.party_id() == Some(id))
    }

    pub fn references_product(&self, id: ProductId) -> bool {
        self.store
            .list()
            .iter()
            .any(|m| m.items.iter().any(|i| i.product_id == id))
    }

    /// Next free reference for a type and day, e.g. `OUT-20240105-0003`.
    ///
    /// `None` once a manually entered reference has used up the counter.
    pub fn next_reference(&self, movement_type: MovementType, day: NaiveDate) -> Option<String> {
        let prefix = format!("{}-{}-", movement_type.reference_prefix(), day.format("%Y%m%d"));
        let last = self
            .store
            .list()
            .iter()
            .filter_map(|m| m.reference.strip_prefix(&prefix).and_then(|n| n.parse::<u64>().ok()))
            .max()
            .unwrap_or(0);
        let next = last.checked_add(1)?;
        Some(format!("{prefix}{next:04}"))
    }
}

impl<S> Projection for MovementsProjection<S>
where
    S: ReadStore<MovementId, MovementReadModel>,
{
    fn name(&self) -> &'static str {
        self.cursors.projection_name()
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::MOVEMENT || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        match decode::<MovementEvent>(envelope)? {
            MovementEvent::Created(e) => {
                ensure_stream(envelope, e.movement_id.aggregate_id())?;
                self.store.upsert(
                    e.movement_id,
                    MovementReadModel {
                        movement_id: e.movement_id,
                        reference: e.reference,
                        movement_type: e.movement_type,
                        status: MovementStatus::Draft,
                        from_warehouse_id: e.from_warehouse,
                        to_warehouse_id: e.to_warehouse,
                        supplier_id: e.supplier_id,
                        customer_id: e.customer_id,
                        created_by: e.created_by,
                        notes: e.notes,
                        moved_at: e.moved_at,
                        items: Vec::new(),
                        cancel_reason: None,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                        completed_at: None,
                        cancelled_at: None,
                    },
                );
            }
            MovementEvent::Updated(e) => {
                ensure_stream(envelope, e.movement_id.aggregate_id())?;
                self.modify(e.movement_id, e.occurred_at, |m| {
                    m.notes = e.notes;
                    m.moved_at = e.moved_at;
                });
            }
            MovementEvent::ItemsAdded(e) => {
                ensure_stream(envelope, e.movement_id.aggregate_id())?;
                self.modify(e.movement_id, e.occurred_at, |m| m.items.extend(e.items));
            }
            MovementEvent::ItemRemoved(e) => {
                ensure_stream(envelope, e.movement_id.aggregate_id())?;
                self.modify(e.movement_id, e.occurred_at, |m| {
                    m.items.retain(|i| i.line_no != e.line_no)
                });
            }
            MovementEvent::Completed(e) => {
                ensure_stream(envelope, e.movement_id.aggregate_id())?;
                self.modify(e.movement_id, e.occurred_at, |m| {
                    m.status = MovementStatus::Completed;
                    m.completed_at = Some(e.occurred_at);
                });
            }
            MovementEvent::Cancelled(e) => {
                ensure_stream(envelope, e.movement_id.aggregate_id())?;
                self.modify(e.movement_id, e.occurred_at, |m| {
                    m.status = MovementStatus::Cancelled;
                    m.cancel_reason = e.reason;
                    m.cancelled_at = Some(e.occurred_at);
                });
            }
            MovementEvent::Deleted(e) => {
                ensure_stream(envelope, e.movement_id.aggregate_id())?;
                self.store.remove(&e.movement_id);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    fn clear(&self) {
        self.store.clear();
        self.cursors.clear();
    }
}

impl<S> MovementsProjection<S>
where
    S: ReadStore<MovementId, MovementReadModel>,
{
    fn modify(&self, id: MovementId, at: DateTime<Utc>, change: impl FnOnce(&mut MovementReadModel)) {
        if let Some(mut rm) = self.store.get(&id) {
            change(&mut rm);
            rm.updated_at = at;
            self.store.upsert(id, rm);
        }
    }
}
