//! Audit document persistence.
//!
//! Each successfully forwarded request produces one [`AuditDocument`] that is
//! written to an object-store bucket. Persistence is best effort: failures are
//! logged and never reach the caller.

use std::sync::Arc;

use async_trait::async_trait;
use audit_common::{audit_object_key, AuditDocument};
use chrono::Utc;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use tokio::sync::OnceCell;
use tracing::Instrument;

use crate::config::AuditConfig;

#[derive(Debug, thiserror::Error)]
pub enum AuditWriteError {
    #[error("Failed to serialize audit document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid audit object key: {0}")]
    Key(#[from] object_store::path::Error),

    #[error("Object store error: {0}")]
    Store(#[from] object_store::Error),
}

/// Destination for audit documents.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist a document. Returns where it was written, or `None` when
    /// auditing is disabled.
    async fn write(&self, document: &AuditDocument) -> Result<Option<String>, AuditWriteError>;
}

/// Writes audit documents to `<prefix>/<yyyy>/<mm>/<dd>/<requestId>.json`.
///
/// The S3 client is built on first use; concurrent first writes share a
/// single initialization.
pub struct ObjectStoreAuditSink {
    bucket: Option<String>,
    prefix: String,
    region: Option<String>,
    store: OnceCell<Arc<dyn ObjectStore>>,
}

impl ObjectStoreAuditSink {
    pub fn from_config(config: &AuditConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
            region: config.region.clone(),
            store: OnceCell::new(),
        }
    }

    /// Use an already constructed store (in-memory stores in tests, custom endpoints).
    pub fn with_store(bucket: &str, prefix: &str, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            bucket: Some(bucket.to_string()),
            prefix: prefix.to_string(),
            region: None,
            store: OnceCell::new_with(Some(store)),
        }
    }

    async fn store(&self, bucket: &str) -> Result<&Arc<dyn ObjectStore>, AuditWriteError> {
        self.store
            .get_or_try_init(|| async {
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(ref region) = self.region {
                    builder = builder.with_region(region);
                }
                let store: Arc<dyn ObjectStore> = Arc::new(builder.build()?);
                tracing::info!("Audit object store initialized for bucket {}", bucket);
                Ok::<_, AuditWriteError>(store)
            })
            .await
    }
}

#[async_trait]
impl AuditSink for ObjectStoreAuditSink {
    async fn write(&self, document: &AuditDocument) -> Result<Option<String>, AuditWriteError> {
        let Some(ref bucket) = self.bucket else {
            tracing::debug!("Audit bucket not set; skipping audit publish");
            return Ok(None);
        };

        let store = self.store(bucket).await?;
        let key = audit_object_key(&self.prefix, Utc::now(), &document.request_id);
        // Stored verbatim so the key matches the reported location
        let path = Path::parse(&key)?;
        let body = document.to_json_bytes()?;

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, "application/json".into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        store
            .put_opts(&path, PutPayload::from(body), options)
            .await?;

        Ok(Some(format!("s3://{}/{}", bucket, key)))
    }
}

/// Persist `document`, awaiting the write unless `detach` is set.
///
/// Either way the outcome is only logged.
pub async fn emit(sink: Arc<dyn AuditSink>, document: AuditDocument, detach: bool) {
    if detach {
        tokio::spawn(
            async move {
                record(sink.as_ref(), &document).await;
            }
            .in_current_span(),
        );
    } else {
        record(sink.as_ref(), &document).await;
    }
}

async fn record(sink: &dyn AuditSink, document: &AuditDocument) {
    match sink.write(document).await {
        Ok(Some(location)) => tracing::info!("Wrote audit record to {}", location),
        Ok(None) => {}
        Err(e) => tracing::error!(
            request_id = %document.request_id,
            "Failed to write audit record: {}",
            e
        ),
    }
}
