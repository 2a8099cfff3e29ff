//! Customers and suppliers share one handler set; the nested router carries
//! the party kind as an extension.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use stockbook_infra::projections::{MovementFilter, PartyReadModel};
use stockbook_parties::{PartyId, PartyKind};

use crate::app::dto::PartyRequest;
use crate::app::errors::ApiError;
use crate::app::routes::common::{created, parse_id, updated};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

struct Permissions {
    read: &'static str,
    create: &'static str,
    update: &'static str,
    delete: &'static str,
}

fn permissions(kind: PartyKind) -> Permissions {
    match kind {
        PartyKind::Customer => Permissions {
            read: "customers.read",
            create: "customers.create",
            update: "customers.update",
            delete: "customers.delete",
        },
        PartyKind::Supplier => Permissions {
            read: "suppliers.read",
            create: "suppliers.create",
            update: "suppliers.update",
            delete: "suppliers.delete",
        },
    }
}

pub fn router(kind: PartyKind) -> Router {
    Router::new()
        .route("/", get(index).post(store))
        .route("/create", get(create))
        .route("/:id", get(show).put(update).delete(destroy))
        .route("/:id/edit", get(edit))
        .layer(Extension(kind))
}

pub async fn index(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
) -> Result<Json<Vec<PartyReadModel>>, ApiError> {
    require(&principal, permissions(kind).read)?;
    Ok(Json(services.projections().parties.list(kind)))
}

pub async fn create(
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, permissions(kind).create)?;
    Ok(Json(serde_json::json!({ "kind": kind })))
}

pub async fn store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Json(body): Json<PartyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, permissions(kind).create)?;
    let id = services.create_party(kind, &body)?;
    Ok(created(id))
}

/// The party with the movements it appears on.
pub async fn show(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, permissions(kind).read)?;
    let party = find(&services, kind, &id)?;
    let movements: Vec<_> = services
        .movement_views(MovementFilter::default())
        .into_iter()
        .filter(|m| m.movement.party_id() == Some(party.party_id))
        .collect();
    Ok(Json(serde_json::json!({ "party": party, "movements": movements })))
}

pub async fn edit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, permissions(kind).update)?;
    Ok(Json(serde_json::json!({ "party": find(&services, kind, &id)? })))
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Path(id): Path<String>,
    Json(body): Json<PartyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, permissions(kind).update)?;
    let id: PartyId = parse_id(&id, kind.as_str())?;
    services.update_party(kind, id, &body)?;
    Ok(updated(id))
}

pub async fn destroy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(kind): Extension<PartyKind>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, permissions(kind).delete)?;
    let id: PartyId = parse_id(&id, kind.as_str())?;
    services.delete_party(kind, id)?;
    Ok(updated(id))
}

fn find(services: &AppServices, kind: PartyKind, raw: &str) -> Result<PartyReadModel, ApiError> {
    let id: PartyId = parse_id(raw, kind.as_str())?;
    match services.projections().parties.get(&id) {
        Some(p) if p.kind == kind => Ok(p),
        _ => Err(ApiError::NotFound(kind.as_str())),
    }
}
