//! Maps `OrchestratorError` onto HTTP responses. A single wrapper type
//! rather than a parallel error enum — `OrchestratorError::status_code()`
//! already carries the mapping `orchestrator-core` was built with, so this
//! layer only needs to turn that into an axum `Response`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use orchestrator_core::OrchestratorError;

/// Newtype so `IntoResponse` can be implemented for a foreign error type.
pub struct ApiError(pub OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_maps_to_400() {
        let err = ApiError(OrchestratorError::validation("bad input"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn not_found_error_maps_to_404() {
        let err = ApiError(OrchestratorError::task_not_found("tx-1"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn database_error_maps_to_500() {
        let err = ApiError(OrchestratorError::database("connection lost"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
