//! Server error types

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

/// Errors that can occur running the lever server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Startup or serve loop failure
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON body for every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Lifecycle error surfaced by a handler
#[derive(Debug)]
pub struct ApiError(pub lever_core::Error);

impl From<lever_core::Error> for ApiError {
    fn from(err: lever_core::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            warn!(error = %self.0, code = self.0.code(), "Rejected request");
            StatusCode::BAD_REQUEST
        } else {
            error!(error = %self.0, code = self.0.code(), "Request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: self.0.code().into(),
            }),
        )
            .into_response()
    }
}
