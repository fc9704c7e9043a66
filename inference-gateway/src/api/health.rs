//! Health check endpoint.

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

/// GET /health - Gateway liveness.
///
/// Answers as soon as the gateway is up, regardless of backend readiness.
pub async fn health() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
