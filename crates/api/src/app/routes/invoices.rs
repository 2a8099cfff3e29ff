use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::header,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};

use stockbook_invoicing::{render_html, render_pdf};
use stockbook_inventory::MovementId;

use crate::app::errors::ApiError;
use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

/// Mounted under `/pdf/operation`.
pub fn router() -> Router {
    Router::new()
        .route("/:id/invoice", get(download))
        .route("/:id/preview", get(preview))
}

/// PDF download (`Content-Disposition: attachment`).
pub async fn download(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require(&principal, "operations.read")?;
    let id: MovementId = parse_id(&id, "movement")?;
    let doc = services.invoice(id)?;
    let bytes = render_pdf(&doc)?;
    tracing::info!(movement_id = %id, number = %doc.number, bytes = bytes.len(), "invoice rendered");

    let disposition = format!("attachment; filename=\"{}\"", doc.file_name());
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// HTML preview of the same document.
pub async fn preview(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Html<String>, ApiError> {
    require(&principal, "operations.read")?;
    let id: MovementId = parse_id(&id, "movement")?;
    let doc = services.invoice(id)?;
    Ok(Html(render_html(&doc)?))
}
