//! API error type mapped to HTTP status codes.
//!
//! Every error body is `{"error": "<code>", "message": "<detail>"}`, with the
//! code taken from [`FptError::code`].

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fpt_core::FptError;
use serde_json::json;

/// Request-level error wrapping the core error type.
///
/// Status mapping:
/// - `Validation` → 400
/// - `InvalidToken` → 401
/// - `WriteDisabled` → 403
/// - `NotFound` → 404
/// - `StoreUnavailable` → 503
/// - everything else → 500
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub FptError);

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            FptError::Validation { .. } => StatusCode::BAD_REQUEST,
            FptError::InvalidToken => StatusCode::UNAUTHORIZED,
            FptError::WriteDisabled => StatusCode::FORBIDDEN,
            FptError::NotFound { .. } => StatusCode::NOT_FOUND,
            FptError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            FptError::Configuration { .. } | FptError::Io { .. } | FptError::Serialization { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(FptError::validation("body", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, source = ?std::error::Error::source(&self.0), "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }

        // Internal details stay in the log
        let message = match &self.0 {
            FptError::Configuration { .. } | FptError::Io { .. } | FptError::Serialization { .. } => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({ "error": self.0.code(), "message": message }));
        (status, body).into_response()
    }
}
