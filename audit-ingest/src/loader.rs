//! Loading audit documents from object storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::ObjectStore;
use serde_json::Value;

use crate::error::{IngestError, Result};

/// Source of raw audit documents.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Fetch and parse the JSON document at `bucket`/`key`.
    async fn load(&self, bucket: &str, key: &str) -> Result<Value>;
}

/// Loads documents through `object_store`, one client per bucket.
///
/// Clients are created on demand and live as long as the loader.
pub struct ObjectStoreLoader {
    region: Option<String>,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl ObjectStoreLoader {
    pub fn new(region: Option<String>) -> Self {
        Self {
            region,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Register a ready-made store for `bucket` (in-memory stores in tests).
    pub fn with_store(self, bucket: &str, store: Arc<dyn ObjectStore>) -> Self {
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(bucket.to_string(), store);
        self
    }

    fn store(&self, bucket: &str) -> std::result::Result<Arc<dyn ObjectStore>, object_store::Error> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(ref region) = self.region {
            builder = builder.with_region(region);
        }
        let store: Arc<dyn ObjectStore> = Arc::new(builder.build()?);
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }
}

#[async_trait]
impl DocumentLoader for ObjectStoreLoader {
    async fn load(&self, bucket: &str, key: &str) -> Result<Value> {
        let load_error = |source| IngestError::Load {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        };

        // Event keys name the object as stored; no further encoding
        let path = Path::parse(key)
            .map_err(object_store::Error::from)
            .map_err(load_error)?;
        let store = self.store(bucket).map_err(load_error)?;
        let bytes = store
            .get(&path)
            .await
            .map_err(load_error)?
            .bytes()
            .await
            .map_err(load_error)?;

        serde_json::from_slice(&bytes).map_err(|source| IngestError::InvalidJson {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        })
    }
}
