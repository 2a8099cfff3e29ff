//! Stock movements ("operations"): the `/operations` resource plus the
//! `/operation/...` workflow endpoints used while building a movement.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};

use stockbook_infra::projections::MovementFilter;
use stockbook_inventory::{MovementId, MovementType};

use crate::app::dto::{
    AddItemsRequest, CancelRequest, MovementFormProps, MovementRequest, MovementView, MovementsQuery,
    UpdateMovementRequest,
};
use crate::app::errors::ApiError;
use crate::app::routes::common::{created, parse_id, updated};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

/// `/operations` resource routes.
pub fn resource_router() -> Router {
    Router::new()
        .route("/", get(index).post(store))
        .route("/create", get(create))
        .route("/:id", get(show).put(update).delete(destroy))
        .route("/:id/edit", get(edit))
}

/// `/operation/...` workflow routes.
pub fn workflow_router() -> Router {
    Router::new()
        .route("/achat", get(incoming_form))
        .route("/vente", get(outgoing_form))
        .route("/trans", get(transfer_form))
        .route("/incoming", post(store_incoming))
        .route("/outgoing", post(store_outgoing))
        .route("/transfer", post(store_transfer))
        .route("/:id/add-products", get(candidates).post(add_products))
        .route("/:id/items/:line_no", delete(remove_item))
        .route("/:id/complete", post(complete))
        .route("/:id/cancel", post(cancel))
}

pub async fn index(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<MovementsQuery>,
) -> Result<Json<Vec<MovementView>>, ApiError> {
    require(&principal, "operations.read")?;
    let filter = MovementFilter {
        movement_type: query.movement_type,
        status: query.status,
        warehouse_id: query.warehouse_id,
    };
    Ok(Json(services.movement_views(filter)))
}

/// Form props; `?type=` picks the movement type (incoming by default).
pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<MovementsQuery>,
) -> Result<Json<MovementFormProps>, ApiError> {
    require(&principal, "operations.create")?;
    Ok(Json(services.movement_form(query.movement_type.unwrap_or(MovementType::In))))
}

pub async fn store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<MovementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "operations.create")?;
    let movement_type = body.movement_type.ok_or_else(|| ApiError::field("type", "is required"))?;
    let id = services.create_movement(principal.user_id(), movement_type, &body)?;
    Ok(created(id))
}

pub async fn show(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<MovementView>, ApiError> {
    require(&principal, "operations.read")?;
    Ok(Json(find(&services, &id)?))
}

pub async fn edit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "operations.update")?;
    let movement = find(&services, &id)?;
    let form = services.movement_form(movement.movement.movement_type);
    Ok(Json(serde_json::json!({ "operation": movement, "form": form })))
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<UpdateMovementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "operations.update")?;
    let id: MovementId = parse_id(&id, "movement")?;
    services.update_movement(id, &body)?;
    Ok(updated(id))
}

pub async fn destroy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "operations.delete")?;
    let id: MovementId = parse_id(&id, "movement")?;
    services.delete_movement(id)?;
    Ok(updated(id))
}

type Services = Extension<Arc<AppServices>>;
type Principal = Extension<PrincipalContext>;

pub async fn incoming_form(s: Services, p: Principal) -> Result<Json<MovementFormProps>, ApiError> {
    form(s, p, MovementType::In)
}

pub async fn outgoing_form(s: Services, p: Principal) -> Result<Json<MovementFormProps>, ApiError> {
    form(s, p, MovementType::Out)
}

pub async fn transfer_form(s: Services, p: Principal) -> Result<Json<MovementFormProps>, ApiError> {
    form(s, p, MovementType::Transfer)
}

fn form(
    Extension(services): Services,
    Extension(principal): Principal,
    movement_type: MovementType,
) -> Result<Json<MovementFormProps>, ApiError> {
    require(&principal, "operations.create")?;
    Ok(Json(services.movement_form(movement_type)))
}

pub async fn store_incoming(s: Services, p: Principal, b: Json<MovementRequest>) -> Result<impl IntoResponse, ApiError> {
    store_typed(s, p, b, MovementType::In)
}

pub async fn store_outgoing(s: Services, p: Principal, b: Json<MovementRequest>) -> Result<impl IntoResponse, ApiError> {
    store_typed(s, p, b, MovementType::Out)
}

pub async fn store_transfer(s: Services, p: Principal, b: Json<MovementRequest>) -> Result<impl IntoResponse, ApiError> {
    store_typed(s, p, b, MovementType::Transfer)
}

/// Typed creation; a `type` in the body is ignored.
fn store_typed(
    Extension(services): Services,
    Extension(principal): Principal,
    Json(body): Json<MovementRequest>,
    movement_type: MovementType,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "operations.create")?;
    let id = services.create_movement(principal.user_id(), movement_type, &body)?;
    Ok(created(id))
}

/// The movement plus the products that can be put on it. Stock figures are
/// for the source warehouse when the movement has one.
pub async fn candidates(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "operations.update")?;
    let movement = find(&services, &id)?;
    let warehouse = movement.movement.from_warehouse_id.or(movement.movement.to_warehouse_id);
    let products = services.search_products("", warehouse, usize::MAX);
    Ok(Json(serde_json::json!({ "operation": movement, "products": products })))
}

pub async fn add_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<AddItemsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "operations.update")?;
    let id: MovementId = parse_id(&id, "movement")?;
    services.add_items(id, &body.items)?;
    Ok(Json(find_by_id(&services, id)?))
}

pub async fn remove_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, line_no)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "operations.update")?;
    let id: MovementId = parse_id(&id, "movement")?;
    let line_no: u32 = parse_id(&line_no, "line")?;
    services.remove_item(id, line_no)?;
    Ok(Json(find_by_id(&services, id)?))
}

pub async fn complete(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "operations.complete")?;
    let id: MovementId = parse_id(&id, "movement")?;
    services.complete_movement(id)?;
    Ok(Json(find_by_id(&services, id)?))
}

pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "operations.cancel")?;
    let id: MovementId = parse_id(&id, "movement")?;
    let reason = body.and_then(|Json(b)| b.reason);
    services.cancel_movement(id, reason)?;
    Ok(Json(find_by_id(&services, id)?))
}

fn find(services: &AppServices, raw: &str) -> Result<MovementView, ApiError> {
    find_by_id(services, parse_id(raw, "movement")?)
}

fn find_by_id(services: &AppServices, id: MovementId) -> Result<MovementView, ApiError> {
    let movement = services.projections().movements.get(&id).ok_or(ApiError::NotFound("movement"))?;
    Ok(services.movement_view(movement))
}
