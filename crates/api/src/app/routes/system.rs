use std::sync::Arc;

use askama::Template;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{Html, IntoResponse},
    Json,
};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> impl IntoResponse {
    let user = services.projections().users.get(&principal.user_id());
    Json(serde_json::json!({
        "user_id": principal.user_id().to_string(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "user": user,
    }))
}

#[derive(Template)]
#[template(path = "landing.html")]
struct LandingTemplate<'a> {
    company: &'a str,
    version: &'a str,
}

/// Public landing page.
pub async fn landing(Extension(services): Extension<Arc<AppServices>>) -> Result<Html<String>, ApiError> {
    let page = LandingTemplate {
        company: &services.company.name,
        version: env!("CARGO_PKG_VERSION"),
    };
    page.render().map(Html).map_err(|e| ApiError::Internal(e.to_string()))
}
