use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use music_core::{MusicError, Stage};
use serde::Serialize;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Music(#[from] MusicError),

    #[error("Audio generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Music(e) => match e {
                MusicError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                MusicError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                MusicError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                MusicError::Synthesis { stage: Stage::Synthesize, .. } => StatusCode::BAD_GATEWAY,
                MusicError::Synthesis { stage: Stage::Encode, .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "request failed: {}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}
