//! Mapping from `promptflam_core::Error` to `{error}` JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use promptflam_chat::ErrorBody;
use promptflam_core::Error;
use tracing::error;

/// Handler error: rendered as `{"error": message}` with a status mirroring
/// the failure class.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Internal details stay in the log.
        let message = match &self.0 {
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => {
                error!("Chat API error: {}", self.0);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
