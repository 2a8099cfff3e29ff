use std::sync::Arc;

use axum::{extract::Extension, Json};
use serde::Serialize;

use stockbook_infra::projections::UserReadModel;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::require;
use crate::context::PrincipalContext;

#[derive(Debug, Serialize)]
pub struct UserView {
    #[serde(flatten)]
    pub user: UserReadModel,
    pub permissions: Vec<String>,
}

pub async fn index(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    require(&principal, "users.read")?;
    let users = services
        .projections()
        .users
        .list()
        .into_iter()
        .map(|user| UserView {
            permissions: user.permissions(),
            user,
        })
        .collect();
    Ok(Json(users))
}
