use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use stockbook_catalog::PackagingTypeId;

use crate::app::dto::{PackagingTypeRequest, PackagingTypeView};
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
) -> Result<Json<Vec<PackagingTypeView>>, ApiError> {
    require(&principal, "packaging-types.read")?;
    Ok(Json(services.packaging_type_views()))
}

pub async fn create(Extension(principal): Extension<PrincipalContext>) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "packaging-types.create")?;
    Ok(Json(serde_json::json!({ "defaults": { "active": true } })))
}

pub async fn store(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<PackagingTypeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "packaging-types.create")?;
    let id = services.create_packaging_type(&body)?;
    Ok(created(id))
}

pub async fn show(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<PackagingTypeView>, ApiError> {
    require(&principal, "packaging-types.read")?;
    Ok(Json(find(&services, &id)?))
}

pub async fn edit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "packaging-types.update")?;
    Ok(Json(serde_json::json!({ "packaging_type": find(&services, &id)? })))
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<PackagingTypeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "packaging-types.update")?;
    let id: PackagingTypeId = parse_id(&id, "packaging type")?;
    services.update_packaging_type(id, &body)?;
    Ok(updated(id))
}

pub async fn destroy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "packaging-types.delete")?;
    let id: PackagingTypeId = parse_id(&id, "packaging type")?;
    services.delete_packaging_type(id)?;
    Ok(updated(id))
}

fn find(services: &AppServices, raw: &str) -> Result<PackagingTypeView, ApiError> {
    let id: PackagingTypeId = parse_id(raw, "packaging type")?;
    services
        .packaging_type_views()
        .into_iter()
        .find(|v| v.packaging_type.packaging_type_id == id)
        .ok_or(ApiError::NotFound("packaging type"))
}
