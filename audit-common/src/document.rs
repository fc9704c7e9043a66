//! Audit document written once per forwarded completion request.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::key::iso_millis;

/// Default maximum number of characters kept in body previews.
pub const DEFAULT_PREVIEW_CHARS: usize = 2048;

/// One proxied request/response exchange, as persisted to object storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDocument {
    pub request_id: String,
    /// ISO-8601 UTC, millisecond precision (`2024-01-01T00:00:00.000+00:00`).
    pub timestamp: String,
    /// Snapshot of the inbound request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub status_code: u16,
    pub latency_ms: u64,
    pub request_body_preview: String,
    pub response_body_preview: String,
    /// Parsed request body, present only when it was valid JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    /// Parsed response body, present only when it was valid JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Value>,
}

impl AuditDocument {
    /// Build a document from a completed exchange, stamped with the current time.
    pub fn capture(
        request_id: String,
        headers: BTreeMap<String, String>,
        request_body: &[u8],
        response_body: &[u8],
        status_code: u16,
        latency_ms: u64,
        preview_chars: usize,
    ) -> Self {
        Self::capture_at(
            Utc::now(),
            request_id,
            headers,
            request_body,
            response_body,
            status_code,
            latency_ms,
            preview_chars,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn capture_at(
        at: DateTime<Utc>,
        request_id: String,
        headers: BTreeMap<String, String>,
        request_body: &[u8],
        response_body: &[u8],
        status_code: u16,
        latency_ms: u64,
        preview_chars: usize,
    ) -> Self {
        let request_text = String::from_utf8_lossy(request_body);
        let response_text = String::from_utf8_lossy(response_body);

        Self {
            request_id,
            timestamp: iso_millis(at),
            headers,
            status_code,
            latency_ms,
            request_body_preview: preview_text(&request_text, preview_chars),
            response_body_preview: preview_text(&response_text, preview_chars),
            request_body: safe_json(request_body),
            response_body: safe_json(response_body),
        }
    }

    /// Serialize to the JSON bytes stored in the audit bucket.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Keep at most `max_chars` characters (not bytes) of `text`.
pub fn preview_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

/// Parse `data` as UTF-8 JSON, returning `None` when it is not.
pub fn safe_json(data: &[u8]) -> Option<Value> {
    let text = std::str::from_utf8(data).ok()?;
    serde_json::from_str(text).ok()
}
