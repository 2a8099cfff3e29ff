use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;

use stockbook_catalog::ProductId;
use stockbook_infra::projections::StockLevel;
use stockbook_inventory::WarehouseId;

use crate::app::dto::{SetLevelRequest, StockLevelView, StockRequest, StocksQuery};
use crate::app::errors::ApiError;
use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(index).post(store))
        .route("/:product_id/:warehouse_id", get(show).put(update).delete(destroy))
}

pub async fn index(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<StocksQuery>,
) -> Result<Json<Vec<StockLevelView>>, ApiError> {
    require(&principal, "stocks.read")?;
    Ok(Json(services.stock_views(&query)))
}

/// Record a counted level for a (product, warehouse) pair.
pub async fn store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<StockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "stocks.adjust")?;
    services.set_stock_level(body.product_id, body.warehouse_id, body.quantity, body.reason)?;
    Ok(Json(level_view(&services, body.product_id, body.warehouse_id)))
}

/// Current level plus the ledger lines behind it.
pub async fn show(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((product_id, warehouse_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "stocks.read")?;
    let (product_id, warehouse_id) = parse_key(&services, &product_id, &warehouse_id)?;
    let history = services.projections().stock.history(product_id, warehouse_id);
    Ok(Json(serde_json::json!({
        "stock": level_view(&services, product_id, warehouse_id),
        "history": history,
    })))
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((product_id, warehouse_id)): Path<(String, String)>,
    Json(body): Json<SetLevelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "stocks.adjust")?;
    let (product_id, warehouse_id) = parse_key(&services, &product_id, &warehouse_id)?;
    services.set_stock_level(product_id, warehouse_id, body.quantity, body.reason)?;
    Ok(Json(level_view(&services, product_id, warehouse_id)))
}

/// Write the level off to zero.
pub async fn destroy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path((product_id, warehouse_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "stocks.adjust")?;
    let (product_id, warehouse_id) = parse_key(&services, &product_id, &warehouse_id)?;
    services.set_stock_level(product_id, warehouse_id, 0, Some("write-off".to_string()))?;
    Ok(Json(level_view(&services, product_id, warehouse_id)))
}

fn parse_key(
    services: &AppServices,
    product_id: &str,
    warehouse_id: &str,
) -> Result<(ProductId, WarehouseId), ApiError> {
    let product_id: ProductId = parse_id(product_id, "product")?;
    let warehouse_id: WarehouseId = parse_id(warehouse_id, "warehouse")?;
    let projections = services.projections();
    projections.products.get(&product_id).ok_or(ApiError::NotFound("product"))?;
    projections.warehouses.get(&warehouse_id).ok_or(ApiError::NotFound("warehouse"))?;
    Ok((product_id, warehouse_id))
}

/// A pair that was never booked reads as zero.
fn level_view(services: &AppServices, product_id: ProductId, warehouse_id: WarehouseId) -> StockLevelView {
    let level = services
        .projections()
        .stock
        .get(product_id, warehouse_id)
        .unwrap_or_else(|| StockLevel {
            product_id,
            warehouse_id,
            quantity: 0,
            updated_at: Utc::now(),
        });
    services.stock_view(level)
}
