//! Audit Common Types
//!
//! Shared schema used by both the inference gateway (writer) and the audit
//! ingest pipeline (reader).

pub mod document;
pub mod key;

pub use document::{preview_text, safe_json, AuditDocument, DEFAULT_PREVIEW_CHARS};
pub use key::{audit_object_key, iso_millis};
