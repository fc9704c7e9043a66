//! Batch ingestion: event records in, index records out.

use std::sync::Arc;

use serde::Serialize;

use crate::error::IngestError;
use crate::event::{EventBatch, EventRecord};
use crate::loader::DocumentLoader;
use crate::record::{IndexRecord, SkipReason};
use crate::store::IndexStore;

/// Per-batch counters. `processed` counts object-store events only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub processed: usize,
    pub written: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// What happened to a single event record.
#[derive(Debug)]
pub enum IngestOutcome {
    Written(IndexRecord),
    Skipped(SkipReason),
    Error(IngestError),
}

pub struct Ingestor {
    loader: Arc<dyn DocumentLoader>,
    store: Arc<dyn IndexStore>,
    preview_chars: usize,
}

impl Ingestor {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        store: Arc<dyn IndexStore>,
        preview_chars: usize,
    ) -> Self {
        Self {
            loader,
            store,
            preview_chars,
        }
    }

    /// Process every record of the batch in order.
    ///
    /// A failing record is logged and counted; it never aborts the batch.
    pub async fn handle_batch(&self, batch: &EventBatch) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for record in batch.records.iter().filter(|r| r.is_object_store_event()) {
            summary.processed += 1;
            match self.ingest(record).await {
                IngestOutcome::Written(_) => summary.written += 1,
                IngestOutcome::Skipped(reason) => {
                    tracing::warn!(
                        event = record.event_name.as_deref().unwrap_or("-"),
                        "Skipping audit object {:?}: {:?}",
                        record.location(),
                        reason
                    );
                    summary.skipped += 1;
                }
                IngestOutcome::Error(e) => {
                    tracing::warn!(
                        event = record.event_name.as_deref().unwrap_or("-"),
                        "Failed to index audit object: {}",
                        e
                    );
                    summary.errors += 1;
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            written = summary.written,
            skipped = summary.skipped,
            errors = summary.errors,
            "Batch ingested"
        );
        summary
    }

    /// Load, transform and store the document named by one event record.
    pub async fn ingest(&self, record: &EventRecord) -> IngestOutcome {
        let Some((bucket, key)) = record.location() else {
            return IngestOutcome::Error(IngestError::MissingLocation);
        };

        let document = match self.loader.load(bucket, key).await {
            Ok(document) => document,
            Err(e) => return IngestOutcome::Error(e),
        };

        let index_record =
            match IndexRecord::from_document(&document, bucket, key, self.preview_chars) {
                Ok(index_record) => index_record,
                Err(reason) => return IngestOutcome::Skipped(reason),
            };

        match self.store.put_item(&index_record).await {
            Ok(()) => IngestOutcome::Written(index_record),
            Err(e) => IngestOutcome::Error(e.into()),
        }
    }
}
