pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod loader;
pub mod record;
pub mod store;
pub mod transform;

pub use config::Config;
pub use error::{IngestError, Result};
pub use event::{EventBatch, EventRecord};
pub use handler::{IngestOutcome, IngestSummary, Ingestor};
pub use loader::{DocumentLoader, ObjectStoreLoader};
pub use record::{IndexRecord, SkipReason};
pub use store::{IndexStore, SqliteIndexStore, StoreError};
