//! Back-office user directory.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use stockbook_auth::{permissions_for_roles, Role, UserEvent, UserId};
use stockbook_events::EventEnvelope;

use crate::projections::cursor_store::{decode, ensure_stream, ProjectionError, StreamCursors};
use crate::projections::Projection;
use crate::read_model::{InMemoryReadStore, ReadStore};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserReadModel {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserReadModel {
    /// Permission names granted by the user's role.
    pub fn permissions(&self) -> Vec<String> {
        let mut names: Vec<String> = permissions_for_roles(&[Role::new(self.role.clone())])
            .into_iter()
            .map(|p| p.as_str().to_string())
            .collect();
        names.sort();
        names
    }
}

#[derive(Debug)]
pub struct UsersProjection<S = InMemoryReadStore<UserId, UserReadModel>> {
    store: S,
    cursors: StreamCursors,
}

impl<S> UsersProjection<S>
where
    S: ReadStore<UserId, UserReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new("auth.users"),
        }
    }

    pub fn get(&self, id: &UserId) -> Option<UserReadModel> {
        self.store.get(id)
    }

    pub fn list(&self) -> Vec<UserReadModel> {
        let mut all = self.store.list();
        all.sort_by(|a, b| a.email.cmp(&b.email));
        all
    }

    pub fn find_by_email(&self, email: &str) -> Option<UserReadModel> {
        let wanted = email.trim().to_lowercase();
        self.store.list().into_iter().find(|u| u.email == wanted)
    }
}

impl<S> Projection for UsersProjection<S>
where
    S: ReadStore<UserId, UserReadModel>,
{
    fn name(&self) -> &'static str {
        self.cursors.projection_name()
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::USER || !self.cursors.should_apply(envelope)? {
            return Ok(());
        }

        match decode::<UserEvent>(envelope)? {
            UserEvent::Registered(e) => {
                ensure_stream(envelope, e.user_id.aggregate_id())?;
                self.store.upsert(
                    e.user_id,
                    UserReadModel {
                        user_id: e.user_id,
                        email: e.email,
                        display_name: e.display_name,
                        role: e.role.as_str().to_string(),
                        active: true,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            UserEvent::Deactivated(e) => {
                ensure_stream(envelope, e.user_id.aggregate_id())?;
                if let Some(mut rm) = self.store.get(&e.user_id) {
                    rm.active = false;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.user_id, rm);
                }
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
