use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockbook_catalog::ProductId;

use crate::app::dto::{ProductRequest, ProductView, SearchQuery};
use crate::app::errors::ApiError;
use crate::app::queries::SEARCH_LIMIT;
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
        .route("/:id/activate", post(activate))
        .route("/:id/deactivate", post(deactivate))
}

pub async fn index(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<Vec<ProductView>>, ApiError> {
    require(&principal, "products.read")?;
    Ok(Json(services.product_views()))
}

/// Category and packaging options for the product form.
pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "products.create")?;
    Ok(Json(form_options(&services)))
}

pub async fn store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "products.create")?;
    let id = services.create_product(&body)?;
    Ok(created(id))
}

pub async fn show(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<ProductView>, ApiError> {
    require(&principal, "products.read")?;
    Ok(Json(find(&services, &id)?))
}

pub async fn edit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "products.update")?;
    let mut props = form_options(&services);
    props["product"] = serde_json::to_value(find(&services, &id)?).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(props))
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<ProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "products.update")?;
    let id: ProductId = parse_id(&id, "product")?;
    services.update_product(id, &body)?;
    Ok(updated(id))
}

pub async fn destroy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "products.delete")?;
    let id: ProductId = parse_id(&id, "product")?;
    services.delete_product(id)?;
    Ok(updated(id))
}

pub async fn activate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "products.activate")?;
    let id: ProductId = parse_id(&id, "product")?;
    services.set_product_active(id, true)?;
    Ok(updated(id))
}

pub async fn deactivate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "products.activate")?;
    let id: ProductId = parse_id(&id, "product")?;
    services.set_product_active(id, false)?;
    Ok(updated(id))
}

/// `GET /product-search?q=&warehouse_id=`: active products for line entry.
pub async fn search(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ProductView>>, ApiError> {
    require(&principal, "products.read")?;
    let limit = query.limit.unwrap_or(SEARCH_LIMIT).min(100);
    Ok(Json(services.search_products(&query.q, query.warehouse_id, limit)))
}

fn find(services: &AppServices, raw: &str) -> Result<ProductView, ApiError> {
    let id: ProductId = parse_id(raw, "product")?;
    let product = services.projections().products.get(&id).ok_or(ApiError::NotFound("product"))?;
    Ok(services.product_view(product))
}

fn form_options(services: &AppServices) -> serde_json::Value {
    let projections = services.projections();
    serde_json::json!({
        "categories": projections.categories.list(),
        "packaging_types": projections
            .packaging_types
            .list()
            .into_iter()
            .filter(|p| p.active)
            .collect::<Vec<_>>(),
    })
}
