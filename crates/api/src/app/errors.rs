//! Consistent JSON error responses.
//!
//! Every failure renders as `{"error": code, "message": ...}`; field failures
//! add `"errors": {"<field>": ["<message>"]}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use stockbook_auth::AuthzError;
use stockbook_core::DomainError;
use stockbook_infra::command_dispatcher::DispatchError;
use stockbook_invoicing::InvoiceError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("{field}: {message}")]
    Field { field: String, message: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid {0} id")]
    InvalidId(&'static str),

    /// The entity is still referenced and cannot be deleted.
    #[error("{0}")]
    InUse(String),

    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error(transparent)]
    Invoice(#[from] InvoiceError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Field name reported for a field error, if any.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            ApiError::Field { field, .. } => Some(field),
            ApiError::Dispatch(DispatchError::FieldInvalid { field, .. }) => Some(field),
            _ => None,
        }
    }

    /// Re-key a field error under `prefix` (e.g. `items.0.quantity`).
    pub fn nest_field(self, prefix: &str) -> Self {
        match self {
            ApiError::Field { field, message }
            | ApiError::Dispatch(DispatchError::FieldInvalid { field, message }) => ApiError::Field {
                field: format!("{prefix}.{field}"),
                message,
            },
            other => other,
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        ApiError::Dispatch(DispatchError::from(value))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Dispatch(e) => dispatch_error_to_response(e),
            ApiError::Field { field, message } => field_error(field, message),
            ApiError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
            ApiError::InvalidId(what) => json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")),
            ApiError::InUse(msg) => json_error(StatusCode::CONFLICT, "in_use", msg),
            ApiError::Forbidden(e) => json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()),
            ApiError::Unauthenticated(msg) => json_error(StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Invoice(e) => match e {
                InvoiceError::NotAvailable(_) => json_error(StatusCode::CONFLICT, "invoice_unavailable", e.to_string()),
                InvoiceError::Overflow { .. } => {
                    json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", e.to_string())
                }
                InvoiceError::Html(_) | InvoiceError::Pdf(_) => {
                    tracing::error!(error = %e, "invoice rendering failed");
                    json_error(StatusCode::INTERNAL_SERVER_ERROR, "render_error", e.to_string())
                }
            },
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        }
    }
}

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => json_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg),
        DispatchError::FieldInvalid { field, message } => field_error(field, message),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Unauthorized => json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized"),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::Deserialize(msg) => {
            tracing::error!(error = %msg, "stored event could not be decoded");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => {
            tracing::error!(error = %e, "event store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

fn field_error(field: String, message: String) -> Response {
    let summary = format!("{field}: {message}");
    let mut errors = serde_json::Map::new();
    errors.insert(field, json!([message]));
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        axum::Json(json!({
            "error": "validation_error",
            "message": summary,
            "errors": errors,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let status = |e: ApiError| e.into_response().status();

        assert_eq!(status(ApiError::field("code", "has already been taken")), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status(DomainError::invariant("x").into()), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status(DomainError::conflict("x").into()), StatusCode::CONFLICT);
        assert_eq!(status(DispatchError::Concurrency("x".into()).into()), StatusCode::CONFLICT);
        assert_eq!(status(ApiError::InUse("x".into())), StatusCode::CONFLICT);
        assert_eq!(status(ApiError::NotFound("product")), StatusCode::NOT_FOUND);
        assert_eq!(status(AuthzError::Forbidden("x".into()).into()), StatusCode::FORBIDDEN);
        assert_eq!(status(ApiError::Unauthenticated("x")), StatusCode::UNAUTHORIZED);
        assert_eq!(status(DispatchError::Publish("x".into()).into()), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn nested_field_errors_keep_their_message() {
        let err = ApiError::from(DomainError::field("unit", "is not a known unit")).nest_field("items.2");
        assert_eq!(err.field_name(), Some("items.2.unit"));
        assert_eq!(err.to_string(), "items.2.unit: is not a known unit");
    }
}
