use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use stockbook_catalog::CategoryId;

use crate::app::dto::{CategoryRequest, CategoryView};
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
) -> Result<Json<Vec<CategoryView>>, ApiError> {
    require(&principal, "categories.read")?;
    Ok(Json(services.category_views()))
}

pub async fn create(Extension(principal): Extension<PrincipalContext>) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "categories.create")?;
    Ok(Json(serde_json::json!({})))
}

pub async fn store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<CategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "categories.create")?;
    let id = services.create_category(&body)?;
    Ok(created(id))
}

pub async fn show(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<CategoryView>, ApiError> {
    require(&principal, "categories.read")?;
    Ok(Json(find(&services, &id)?))
}

pub async fn edit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "categories.update")?;
    Ok(Json(serde_json::json!({ "category": find(&services, &id)? })))
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<CategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "categories.update")?;
    let id: CategoryId = parse_id(&id, "category")?;
    services.update_category(id, &body)?;
    Ok(updated(id))
}

pub async fn destroy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "categories.delete")?;
    let id: CategoryId = parse_id(&id, "category")?;
    services.delete_category(id)?;
    Ok(updated(id))
}

fn find(services: &AppServices, raw: &str) -> Result<CategoryView, ApiError> {
    let id: CategoryId = parse_id(raw, "category")?;
    services
        .category_views()
        .into_iter()
        .find(|v| v.category.category_id == id)
        .ok_or(ApiError::NotFound("category"))
}
