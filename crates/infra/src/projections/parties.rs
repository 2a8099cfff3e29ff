use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use stockbook_events::EventEnvelope;
use stockbook_parties::{PartyEvent, PartyId, PartyKind};

use crate::projections::cursor_store::{decode, ensure_stream, ProjectionError, StreamCursors};
use crate::projections::Projection;
use crate::read_model::{InMemoryReadStore, ReadStore};
use crate::streams;

/// Customer or supplier directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartyReadModel {
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct PartiesProjection<S = InMemoryReadStore<PartyId, PartyReadModel>> {
    store: S,
    cursors: StreamCursors,
}

impl<S> PartiesProjection<S>
where
    S: ReadStore<PartyId, PartyReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new("parties.directory"),
        }
    }

    pub fn get(&self, id: &PartyId) -> Option<PartyReadModel> {
        self.store.get(id)
    }

    /// Parties of one kind, by name.
    pub fn list(&self, kind: PartyKind) -> Vec<PartyReadModel> {
        let mut all: Vec<_> = self.store.list().into_iter().filter(|p| p.kind == kind).collect();
        all.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        all
    }
}

impl<S> Projection for PartiesProjection<S>
where
    S: ReadStore<PartyId, PartyReadModel>,
{
    fn name(&self) -> &'static str {
        self.cursors.projection_name()
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::PARTY || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        match decode::<PartyEvent>(envelope)? {
            PartyEvent::PartyRegistered(e) => {
                ensure_stream(envelope, e.party_id.aggregate_id())?;
                self.store.upsert(
                    e.party_id,
                    PartyReadModel {
                        party_id: e.party_id,
                        kind: e.kind,
                        name: e.name,
                        email: e.contact.email,
                        phone: e.contact.phone,
                        address: e.contact.address,
                        tax_id: e.tax_id,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            PartyEvent::PartyUpdated(e) => {
                ensure_stream(envelope, e.party_id.aggregate_id())?;
                if let Some(mut rm) = self.store.get(&e.party_id) {
                    rm.name = e.name;
                    rm.email = e.contact.email;
                    rm.phone = e.contact.phone;
                    rm.address = e.contact.address;
                    rm.tax_id = e.tax_id;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.party_id, rm);
                }
            }
            PartyEvent::PartyDeleted(e) => {
                ensure_stream(envelope, e.party_id.aggregate_id())?;
                self.store.remove(&e.party_id);
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
