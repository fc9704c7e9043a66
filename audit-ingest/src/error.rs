//! Error types for the ingest pipeline.

use crate::store::StoreError;

/// Failures that count against a batch's `errors` counter.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Event record names no bucket/object key")]
    MissingLocation,

    #[error("Unable to load audit object s3://{bucket}/{key}: {source}")]
    Load {
        bucket: String,
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("Invalid JSON in audit object s3://{bucket}/{key}: {source}")]
    InvalidJson {
        bucket: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write index record: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
