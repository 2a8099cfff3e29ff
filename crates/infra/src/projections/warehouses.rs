use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use stockbook_events::EventEnvelope;
use stockbook_inventory::{WarehouseEvent, WarehouseId};

use crate::projections::cursor_store::{decode, ensure_stream, ProjectionError, StreamCursors};
use crate::projections::Projection;
use crate::read_model::{InMemoryReadStore, ReadStore};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarehouseReadModel {
    pub warehouse_id: WarehouseId,
    pub name: String,
    pub code: String,
    pub address: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct WarehousesProjection<S = InMemoryReadStore<WarehouseId, WarehouseReadModel>> {
    store: S,
    cursors: StreamCursors,
}

impl<S> WarehousesProjection<S>
where
    S: ReadStore<WarehouseId, WarehouseReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new("inventory.warehouses"),
        }
    }

    pub fn get(&self, id: &WarehouseId) -> Option<WarehouseReadModel> {
        self.store.get(id)
    }

    pub fn list(&self) -> Vec<WarehouseReadModel> {
        let mut all = self.store.list();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        all
    }

    pub fn find_by_code(&self, code: &str) -> Option<WarehouseReadModel> {
        let wanted = code.trim().to_uppercase();
        self.store.list().into_iter().find(|w| w.code == wanted)
    }
}

impl<S> Projection for WarehousesProjection<S>
where
    S: ReadStore<WarehouseId, WarehouseReadModel>,
{
    fn name(&self) -> &'static str {
        self.cursors.projection_name()
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::WAREHOUSE || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        match decode::<WarehouseEvent>(envelope)? {
            WarehouseEvent::Created(e) => {
                ensure_stream(envelope, e.warehouse_id.aggregate_id())?;
                self.store.upsert(
                    e.warehouse_id,
                    WarehouseReadModel {
                        warehouse_id: e.warehouse_id,
                        name: e.name,
                        code: e.code,
                        address: e.address,
                        active: e.active,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            WarehouseEvent::Updated(e) => {
                ensure_stream(envelope, e.warehouse_id.aggregate_id())?;
                if let Some(mut rm) = self.store.get(&e.warehouse_id) {
                    rm.name = e.name;
                    rm.code = e.code;
                    rm.address = e.address;
                    rm.active = e.active;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.warehouse_id, rm);
                }
            }
            WarehouseEvent::Deleted(e) => {
                ensure_stream(envelope, e.warehouse_id.aggregate_id())?;
                self.store.remove(&e.warehouse_id);
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
