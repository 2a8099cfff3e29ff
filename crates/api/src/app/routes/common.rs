use std::str::FromStr;

use axum::{http::StatusCode, response::IntoResponse, Json};

use crate::app::errors::ApiError;

/// Parse a path segment into a typed id; `what` names it in the 400 body.
pub fn parse_id<T: FromStr>(raw: &str, what: &'static str) -> Result<T, ApiError> {
    raw.parse().map_err(|_| ApiError::InvalidId(what))
}

/// `201 Created` with `{"id": ...}`.
pub fn created(id: impl ToString) -> impl IntoResponse {
    (StatusCode::CREATED, Json(serde_json::json!({ "id": id.to_string() })))
}

/// `200 OK` with `{"id": ...}` after a successful change.
pub fn updated(id: impl ToString) -> impl IntoResponse {
    Json(serde_json::json!({ "id": id.to_string() }))
}

#[cfg(test)]
mod tests {
    use stockbook_catalog::ProductId;

    use super::*;

    #[test]
    fn malformed_ids_map_to_invalid_id() {
        assert!(matches!(parse_id::<ProductId>("nope", "product"), Err(ApiError::InvalidId("product"))));
        let id = ProductId::generate();
        assert_eq!(parse_id::<ProductId>(&id.to_string(), "product").unwrap(), id);
    }
}
