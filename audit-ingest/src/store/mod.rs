//! Index record persistence.

mod sqlite;

pub use sqlite::SqliteIndexStore;

use async_trait::async_trait;

use crate::record::IndexRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value store holding index records.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Upsert by primary key (`id`, `createdAt`). Absent fields are not stored.
    async fn put_item(&self, record: &IndexRecord) -> Result<(), StoreError>;
}
