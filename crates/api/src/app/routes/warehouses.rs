use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use stockbook_infra::projections::WarehouseReadModel;
use stockbook_inventory::WarehouseId;

use crate::app::dto::WarehouseRequest;
use crate::app::errors::ApiError;
use crate::app::routes::common::{created, parse_id, updated};
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(index).post(store))
        .route("/create", get(create))
        .route("/:id", get(show).put(update).delete(destroy))
        .route("/:id/edit", get(edit))
}

pub async fn index(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<Vec<WarehouseReadModel>>, ApiError> {
    require(&principal, "warehouses.read")?;
    Ok(Json(services.projections().warehouses.list()))
}

pub async fn create(Extension(principal): Extension<PrincipalContext>) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "warehouses.create")?;
    Ok(Json(serde_json::json!({ "defaults": { "active": true } })))
}

pub async fn store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<WarehouseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "warehouses.create")?;
    let id = services.create_warehouse(&body)?;
    Ok(created(id))
}

/// The warehouse with its current stock levels.
pub async fn show(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "warehouses.read")?;
    let warehouse = find(&services, &id)?;
    let stocks = services.stock_views(&crate::app::dto::StocksQuery {
        warehouse_id: Some(warehouse.warehouse_id),
        ..Default::default()
    });
    Ok(Json(serde_json::json!({ "warehouse": warehouse, "stocks": stocks })))
}

pub async fn edit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "warehouses.update")?;
    Ok(Json(serde_json::json!({ "warehouse": find(&services, &id)? })))
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<WarehouseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "warehouses.update")?;
    let id: WarehouseId = parse_id(&id, "warehouse")?;
    services.update_warehouse(id, &body)?;
    Ok(updated(id))
}

pub async fn destroy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "warehouses.delete")?;
    let id: WarehouseId = parse_id(&id, "warehouse")?;
    services.delete_warehouse(id)?;
    Ok(updated(id))
}

fn find(services: &AppServices, raw: &str) -> Result<WarehouseReadModel, ApiError> {
    let id: WarehouseId = parse_id(raw, "warehouse")?;
    services.projections().warehouses.get(&id).ok_or(ApiError::NotFound("warehouse"))
}
