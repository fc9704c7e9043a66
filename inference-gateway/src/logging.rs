//! Per-request log context.
//!
//! Every HTTP request runs inside a `request` span carrying its request id,
//! so the access line, the forwarding lines and the audit write share one id.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::Instrument;

use crate::proxy;

/// Request id resolved once per request (caller's `x-request-id` or a fresh UUID).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Middleware that resolves the request id, runs the request in a span
/// tagged with it and logs the outcome at INFO level.
pub async fn request_logger(mut request: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = proxy::request_id(request.headers());
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    request.extensions_mut().insert(RequestId(request_id));

    let response = next.run(request).instrument(span.clone()).await;

    span.in_scope(|| {
        tracing::info!(
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "HTTP request"
        )
    });

    response
}
