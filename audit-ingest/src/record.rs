//! Denormalized index record derived from an audit document.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transform::{build_preview, clean_str, clean_value, normalize_timestamp, safe_int};

/// Header naming the calling project. Required.
pub const PROJECT_HEADER: &str = "x-llm-source";
pub const USER_HEADER: &str = "x-llm-user";
pub const REQUEST_TYPE_HEADER: &str = "x-llm-request-type";

/// Why a document produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingRequestId,
    MissingProject,
}

/// Index store item.
///
/// Keyed by `id` (`project#<project>`) and `createdAt` (`<ts>#<requestId>`).
/// The `*Pk`/`*Sk` attributes feed the secondary indexes and are only present
/// when their source value is; absent fields are omitted when serialized so
/// those indexes never see them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    pub id: String,
    pub created_at: String,
    pub timestamp: String,
    pub request_id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_preview: Option<String>,
    pub audit_bucket: String,
    pub audit_object_key: String,

    // by user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id_pk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id_sk: Option<String>,
    // by status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_pk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_sk: Option<String>,
    // latency per project
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_pk: Option<String>,
}

impl IndexRecord {
    /// Derive the record for the document stored at `bucket`/`key`.
    pub fn from_document(
        document: &Value,
        bucket: &str,
        key: &str,
        preview_chars: usize,
    ) -> Result<Self, SkipReason> {
        let request_id =
            clean_value(document.get("requestId")).ok_or(SkipReason::MissingRequestId)?;

        let headers = lowercase_headers(document.get("headers"));
        let header = |name: &str| headers.get(name).and_then(|v| clean_str(v));

        let project = header(PROJECT_HEADER).ok_or(SkipReason::MissingProject)?;
        let user_id = header(USER_HEADER);
        let request_type = header(REQUEST_TYPE_HEADER);
        let latency_ms = safe_int(document.get("latencyMs"));
        let status_code = safe_int(document.get("statusCode"));
        let timestamp = normalize_timestamp(document.get("timestamp"));

        let prompt_preview = preview(document, "requestBodyPreview", "requestBody", preview_chars);
        let response_preview =
            preview(document, "responseBodyPreview", "responseBody", preview_chars);

        let project_key = format!("project#{}", project);
        let sort_key = format!("{}#{}", timestamp, request_id);

        Ok(Self {
            user_id_pk: user_id.as_ref().map(|user| format!("user#{}", user)),
            user_id_sk: user_id.as_ref().map(|_| sort_key.clone()),
            status_pk: status_code.map(|code| format!("status#{}", code)),
            status_sk: status_code.map(|_| format!("{}#{}#{}", timestamp, project, request_id)),
            latency_pk: latency_ms.map(|_| project_key.clone()),
            id: project_key,
            created_at: sort_key,
            timestamp,
            request_id,
            project_id: project,
            user_id,
            request_type,
            status_code,
            latency_ms,
            prompt_preview,
            response_preview,
            audit_bucket: bucket.to_string(),
            audit_object_key: key.to_string(),
        })
    }

    /// The sparse attribute map written to the index store.
    pub fn to_item(&self) -> serde_json::Result<serde_json::Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "index record serialized to {} instead of an object",
                other
            ))),
        }
    }
}

/// Header map with lowercased names. Non-string values are rendered as text.
fn lowercase_headers(headers: Option<&Value>) -> HashMap<String, String> {
    let Some(Value::Object(map)) = headers else {
        return HashMap::new();
    };
    map.iter()
        .filter_map(|(name, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Null => return None,
                other => other.to_string(),
            };
            Some((name.to_lowercase(), value))
        })
        .collect()
}

/// Explicit preview field if the document has one, else a preview of the parsed body.
fn preview(document: &Value, preview_field: &str, body_field: &str, max_chars: usize) -> Option<String> {
    match document.get(preview_field) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => document
            .get(body_field)
            .and_then(|body| build_preview(body, max_chars)),
        Some(other) => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "requestId": "r1",
            "timestamp": "2024-01-01T00:00:00Z",
            "headers": {"x-llm-source": "proj1", "x-llm-user": "u1"},
            "statusCode": 200,
            "latencyMs": 50,
            "requestBodyPreview": "{\"messages\":[]}",
            "responseBodyPreview": "{\"choices\":[]}"
        })
    }

    #[test]
    fn test_keys_and_projections() {
        let record =
            IndexRecord::from_document(&document(), "audits", "logs/2024/01/01/r1.json", 2048)
                .unwrap();
        let ts = "2024-01-01T00:00:00.000+00:00";

        assert_eq!(record.id, "project#proj1");
        assert_eq!(record.created_at, format!("{}#r1", ts));
        assert_eq!(record.timestamp, ts);
        assert_eq!(record.project_id, "proj1");
        assert_eq!(record.user_id.as_deref(), Some("u1"));
        assert_eq!(record.user_id_pk.as_deref(), Some("user#u1"));
        assert_eq!(record.user_id_sk.as_deref(), Some(format!("{}#r1", ts).as_str()));
        assert_eq!(record.status_pk.as_deref(), Some("status#200"));
        assert_eq!(record.status_sk.as_deref(), Some(format!("{}#proj1#r1", ts).as_str()));
        assert_eq!(record.latency_pk.as_deref(), Some("project#proj1"));
        assert_eq!(record.status_code, Some(200));
        assert_eq!(record.latency_ms, Some(50));
        assert_eq!(record.audit_bucket, "audits");
        assert_eq!(record.audit_object_key, "logs/2024/01/01/r1.json");
        assert_eq!(record.prompt_preview.as_deref(), Some("{\"messages\":[]}"));
    }

    #[test]
    fn test_item_is_sparse() {
        let doc = json!({
            "requestId": "r2",
            "timestamp": "2024-01-01T00:00:00Z",
            "headers": {"X-LLM-Source": "proj1", "x-llm-user": "-"}
        });
        let item = IndexRecord::from_document(&doc, "b", "k", 2048)
            .unwrap()
            .to_item()
            .unwrap();

        for absent in [
            "userId", "requestType", "statusCode", "latencyMs", "promptPreview",
            "responsePreview", "userIdPk", "userIdSk", "statusPk", "statusSk", "latencyPk",
        ] {
            assert!(!item.contains_key(absent), "{} should be omitted", absent);
        }
        assert_eq!(item["id"], "project#proj1");
        assert_eq!(item["requestId"], "r2");
        assert!(item.values().all(|v| !v.is_null()));
    }

    #[test]
    fn test_item_round_trips_to_record() {
        let record =
            IndexRecord::from_document(&document(), "audits", "logs/r1.json", 2048).unwrap();
        let item = record.to_item().unwrap();
        assert_eq!(item["createdAt"], record.created_at.as_str());

        let decoded: IndexRecord = serde_json::from_value(Value::Object(item)).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let doc = json!({
            "requestId": "r3",
            "headers": {"X-Llm-Source": " proj2 ", "X-LLM-REQUEST-TYPE": "chat"}
        });
        let record = IndexRecord::from_document(&doc, "b", "k", 2048).unwrap();
        assert_eq!(record.project_id, "proj2");
        assert_eq!(record.request_type.as_deref(), Some("chat"));
    }

    #[test]
    fn test_skip_without_request_id() {
        let mut doc = document();
        doc["requestId"] = json!("  ");
        assert_eq!(
            IndexRecord::from_document(&doc, "b", "k", 2048),
            Err(SkipReason::MissingRequestId)
        );
    }

    #[test]
    fn test_skip_without_project() {
        let mut doc = document();
        doc["headers"] = json!({"x-llm-user": "u1"});
        assert_eq!(
            IndexRecord::from_document(&doc, "b", "k", 2048),
            Err(SkipReason::MissingProject)
        );

        doc["headers"] = json!({"x-llm-source": "-($request.header.get('x-llm-source'))"});
        assert_eq!(
            IndexRecord::from_document(&doc, "b", "k", 2048),
            Err(SkipReason::MissingProject)
        );
    }

    #[test]
    fn test_preview_built_from_parsed_body() {
        let doc = json!({
            "requestId": "r4",
            "headers": {"x-llm-source": "p"},
            "requestBody": {"messages": [{"role": "user", "content": "hello"}]},
            "responseBody": "  plain text answer  ",
            "responseBodyPreview": null
        });
        let record = IndexRecord::from_document(&doc, "b", "k", 12).unwrap();
        assert_eq!(record.prompt_preview.as_deref(), Some("{\"messages\":"));
        assert_eq!(record.response_preview.as_deref(), Some("plain text a"));
    }

    #[test]
    fn test_string_typed_numbers_are_coerced() {
        let mut doc = document();
        doc["statusCode"] = json!("502");
        doc["latencyMs"] = json!("n/a");
        let record = IndexRecord::from_document(&doc, "b", "k", 2048).unwrap();
        assert_eq!(record.status_pk.as_deref(), Some("status#502"));
        assert!(record.latency_ms.is_none());
        assert!(record.latency_pk.is_none());
    }
}
