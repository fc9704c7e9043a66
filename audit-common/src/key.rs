//! Object key layout for audit documents.

use chrono::{DateTime, SecondsFormat, Utc};

/// Render an instant the way audit documents and index records store it.
pub fn iso_millis(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// `<prefix>/<yyyy>/<mm>/<dd>/<request_id>.json`, partitioned by the UTC date of `at`.
pub fn audit_object_key(prefix: &str, at: DateTime<Utc>, request_id: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    format!("{}/{}/{}.json", prefix, at.format("%Y/%m/%d"), request_id)
}
