//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::ErrorKind;
use workflow::WorkflowError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// No caller identity on the request.
    Unauthorized(String),
    /// The caller lacks the required role.
    Forbidden(String),
    /// Failure reported by a workflow service.
    Workflow(WorkflowError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Workflow(err) => workflow_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn workflow_error_to_response(err: WorkflowError) -> (StatusCode, String) {
    if err.is_forbidden() {
        return (StatusCode::FORBIDDEN, err.to_string());
    }
    let status = match err.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::External => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => {
            tracing::error!(error = %err, "internal server error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        ApiError::Workflow(err)
    }
}

impl From<common::PageError> for ApiError {
    fn from(err: common::PageError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
