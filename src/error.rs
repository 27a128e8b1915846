use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::delivery::DeliveryStatus;

/// Every failure in this service is recoverable: operations either succeed
/// or return one of these, leaving state unchanged.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A proposed assignment violated one or more scheduling rules. Carries
    /// the complete list, not just the first violation.
    #[error("assignment validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The requested lifecycle action is not legal for the delivery's
    /// current status. The delivery is left untouched.
    #[error("cannot {action} a delivery that is {status}")]
    IllegalTransition {
        status: DeliveryStatus,
        action: &'static str,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            AppError::Validation(violations) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": "assignment validation failed",
                    "violations": violations,
                }),
            ),
            AppError::IllegalTransition { .. } => {
                (StatusCode::CONFLICT, json!({ "error": self.to_string() }))
            }
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
        };

        (status, Json(body)).into_response()
    }
}
