//! Object-store event notifications that trigger ingestion.

use serde::Deserialize;

/// Event source of object-store write notifications.
pub const OBJECT_STORE_EVENT_SOURCE: &str = "aws:s3";

/// A batch of event records as delivered by the notification service.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EventBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(default)]
    pub event_source: Option<String>,
    /// Reported in skip and failure log lines.
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub s3: Option<S3Entity>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct S3Entity {
    #[serde(default)]
    pub bucket: Option<S3Bucket>,
    #[serde(default)]
    pub object: Option<S3Object>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Object {
    pub key: String,
}

impl EventRecord {
    /// Only object-store notifications are ingested; everything else is ignored.
    pub fn is_object_store_event(&self) -> bool {
        self.event_source.as_deref() == Some(OBJECT_STORE_EVENT_SOURCE)
    }

    /// Bucket name and object key named by the event, if both are present.
    pub fn location(&self) -> Option<(&str, &str)> {
        let s3 = self.s3.as_ref()?;
        let bucket = s3.bucket.as_ref()?;
        let object = s3.object.as_ref()?;
        Some((bucket.name.as_str(), object.key.as_str()))
    }
}
