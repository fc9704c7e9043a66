//! Forwarding of raw requests to the backend inference server.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use reqwest::Client;
use tokio::sync::Semaphore;

/// Header carrying a caller-supplied request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Response headers that describe the backend connection's framing and
/// must not be replayed to the caller.
const FRAMING_HEADERS: [HeaderName; 3] = [CONTENT_LENGTH, TRANSFER_ENCODING, CONNECTION];

/// Long-lived, pooled HTTP client bound to the backend's base URL.
///
/// At most `max_connections` exchanges are in flight at once; further
/// requests wait for a slot. Cloning is cheap and shares both the pool and
/// the limit.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http_client: Client,
    base_url: String,
    permits: Arc<Semaphore>,
}

/// A fully buffered backend response.
#[derive(Debug)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BackendClient {
    /// Build a client with no request timeout; large-model completions can take minutes.
    pub fn new(
        base_url: &str,
        pool_idle_per_host: usize,
        max_connections: usize,
    ) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder()
            .pool_max_idle_per_host(pool_idle_per_host)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            permits: Arc::new(Semaphore::new(max_connections.max(1))),
        })
    }

    /// Exchanges that could start right now without waiting.
    pub fn available_connections(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `path` on the backend and buffer the whole response.
    ///
    /// Any error here is a transport failure: the backend answered nothing usable.
    pub async fn forward(
        &self,
        path: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<BackendResponse, reqwest::Error> {
        let url = format!("{}{}", self.base_url, path);

        // The semaphore is never closed, so acquiring only waits
        let _permit = self.permits.acquire().await.ok();

        let response = self
            .http_client
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(BackendResponse {
            status,
            headers,
            body,
        })
    }
}

impl IntoResponse for BackendResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = strip_framing_headers(&self.headers);
        response
    }
}

/// The caller's `x-request-id`, or a fresh UUID.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Inbound headers minus `Host`, which names the gateway rather than the backend.
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    forwarded.remove(HOST);
    forwarded
}

pub fn strip_framing_headers(headers: &HeaderMap) -> HeaderMap {
    let mut stripped = headers.clone();
    for name in &FRAMING_HEADERS {
        stripped.remove(name);
    }
    stripped
}

/// Flatten headers into the audit snapshot. Repeated headers keep the last value.
pub fn header_snapshot(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}
