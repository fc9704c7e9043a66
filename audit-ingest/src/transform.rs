//! Field cleaning and normalization applied to audit documents before indexing.

use audit_common::{iso_millis, preview_text};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Clean a loosely typed document field.
///
/// Strings are trimmed and discarded when they carry no information: empty,
/// `-`, `null` in any case, anything starting with `--`, or the leftover of a
/// failed header template substitution (`-(... header.get(...)`). Other
/// scalars are rendered as text. Applying it twice gives the same result.
pub fn clean_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => clean_str(s),
        other => Some(other.to_string()),
    }
}

pub fn clean_str(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || trimmed == "-"
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.starts_with("--")
    {
        return None;
    }
    // Upstream header templating has been seen to emit the raw expression
    // text, e.g. `-($request.header.get('x-llm-user'))`.
    // TODO: drop once stored documents no longer contain this pattern.
    if trimmed.starts_with("-(") && trimmed.contains("header.get(") {
        return None;
    }
    Some(trimmed.to_string())
}

/// Integer coercion: integers as-is, floats truncated, numeric strings parsed.
pub fn safe_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Normalize an ISO-8601 timestamp to UTC with millisecond precision.
///
/// Anything missing or unparseable is replaced by the current instant.
pub fn normalize_timestamp(value: Option<&Value>) -> String {
    normalize_timestamp_at(value, Utc::now())
}

pub fn normalize_timestamp_at(value: Option<&Value>, now: DateTime<Utc>) -> String {
    let parsed = match value {
        Some(Value::String(s)) if !s.is_empty() => parse_iso8601(s.trim()),
        _ => None,
    };
    iso_millis(parsed.unwrap_or(now))
}

fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    // Timestamps without an offset are taken as UTC
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Text preview of a parsed body: strings verbatim, anything else JSON-encoded,
/// then trimmed and cut to `max_chars` characters.
pub fn build_preview(payload: &Value, max_chars: usize) -> Option<String> {
    let text = match payload {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).ok()?,
    };
    Some(preview_text(text.trim(), max_chars))
}
