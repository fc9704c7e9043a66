//! Chat completions endpoint, proxied to the backend with audit capture.

use std::sync::Arc;
use std::time::Instant;

use audit_common::AuditDocument;
use axum::body::Bytes;
use axum::extract::State;
use axum::Extension;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;

use crate::audit;
use crate::error::{Error, Result};
use crate::logging::RequestId;
use crate::proxy;
use crate::state::AppState;

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Build the chat router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat/completions", post(chat_completions))
}

/// POST /v1/chat/completions - forwarded verbatim to the backend.
async fn chat_completions(
    State(state): State<Arc<AppState>>,
    request_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let backend = state.backend().ok_or(Error::BackendNotReady)?;

    // Set by the request logger; absent when mounted without it
    let request_id = match request_id {
        Some(Extension(RequestId(id))) => id,
        None => proxy::request_id(&headers),
    };
    let snapshot = proxy::header_snapshot(&headers);

    tracing::info!("Forwarding request {} to backend", request_id);
    let start = Instant::now();
    let upstream = backend
        .forward(COMPLETIONS_PATH, proxy::forwardable_headers(&headers), body.clone())
        .await
        .map_err(|e| {
            tracing::error!(
                "Request {} failed when forwarding to backend: {}",
                request_id,
                e
            );
            Error::Upstream(e)
        })?;
    let latency_ms = start.elapsed().as_millis() as u64;

    let document = AuditDocument::capture(
        request_id,
        snapshot,
        &body,
        &upstream.body,
        upstream.status.as_u16(),
        latency_ms,
        state.config.audit.body_preview,
    );
    audit::emit(
        state.audit_sink.clone(),
        document,
        state.config.audit.detach_writes,
    )
    .await;

    Ok(upstream.into_response())
}
