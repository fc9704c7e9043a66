//! Error types for the gateway HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Errors surfaced to gateway callers.
///
/// Messages stay generic; details go to the log.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Backend not ready")]
    BackendNotReady,

    #[error("Upstream backend error")]
    Upstream(#[source] reqwest::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::BackendNotReady => (StatusCode::SERVICE_UNAVAILABLE, "backend_not_ready"),
            Error::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
