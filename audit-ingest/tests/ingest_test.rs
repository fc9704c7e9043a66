//! End-to-end ingestion: object store events through to the SQLite index.

use std::sync::Arc;

use audit_ingest::{EventBatch, Ingestor, IngestSummary, ObjectStoreLoader, SqliteIndexStore};
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use serde_json::{json, Value};

const BUCKET: &str = "gateway-audits";

async fn put(store: &InMemory, key: &str, document: &Value) {
    store
        .put(&Path::parse(key).unwrap(), PutPayload::from(serde_json::to_vec(document).unwrap()))
        .await
        .unwrap();
}

fn batch(keys: &[&str]) -> EventBatch {
    let records: Vec<Value> = keys
        .iter()
        .map(|key| {
            json!({
                "eventSource": "aws:s3",
                "eventName": "ObjectCreated:Put",
                "s3": {"bucket": {"name": BUCKET}, "object": {"key": key}}
            })
        })
        .collect();
    serde_json::from_value(json!({ "Records": records })).unwrap()
}

async fn setup() -> (Arc<InMemory>, Arc<SqliteIndexStore>, Ingestor) {
    let objects = Arc::new(InMemory::new());
    let index = Arc::new(SqliteIndexStore::new(":memory:").unwrap());
    let loader = Arc::new(ObjectStoreLoader::new(None).with_store(BUCKET, objects.clone()));
    let ingestor = Ingestor::new(loader, index.clone(), 2048);
    (objects, index, ingestor)
}

#[tokio::test]
async fn test_gateway_document_indexed() {
    let (objects, index, ingestor) = setup().await;
    let key = "logs/2024/01/01/r1.json";
    put(
        &objects,
        key,
        &json!({
            "requestId": "r1",
            "timestamp": "2024-01-01T00:00:00Z",
            "headers": {"x-llm-source": "proj1", "x-llm-user": "u1", "content-type": "application/json"},
            "statusCode": 200,
            "latencyMs": 50,
            "requestBodyPreview": "{\"messages\":[]}",
            "responseBodyPreview": "{\"choices\":[]}",
            "requestBody": {"messages": []},
            "responseBody": {"choices": []}
        }),
    )
    .await;

    let summary = ingestor.handle_batch(&batch(&[key])).await;
    assert_eq!(summary, IngestSummary { processed: 1, written: 1, skipped: 0, errors: 0 });

    let records = index.query_by_project("proj1", 10).unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, "project#proj1");
    assert_eq!(record.created_at, "2024-01-01T00:00:00.000+00:00#r1");
    assert_eq!(record.user_id_pk.as_deref(), Some("user#u1"));
    assert_eq!(record.status_pk.as_deref(), Some("status#200"));
    assert_eq!(
        record.status_sk.as_deref(),
        Some("2024-01-01T00:00:00.000+00:00#proj1#r1")
    );
    assert_eq!(record.latency_pk.as_deref(), Some("project#proj1"));
    assert_eq!(record.audit_bucket, BUCKET);
    assert_eq!(record.audit_object_key, key);

    assert_eq!(index.query_by_user("u1", 10).unwrap(), records);
    assert_eq!(index.query_by_status(200, 10).unwrap(), records);
}

#[tokio::test]
async fn test_document_without_project_is_skipped() {
    let (objects, index, ingestor) = setup().await;
    put(
        &objects,
        "logs/anon.json",
        &json!({"requestId": "r2", "headers": {"x-llm-user": "u1"}, "statusCode": 200}),
    )
    .await;

    let summary = ingestor.handle_batch(&batch(&["logs/anon.json"])).await;
    assert_eq!(summary, IngestSummary { processed: 1, written: 0, skipped: 1, errors: 0 });
    assert!(index.query_by_user("u1", 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_failures_do_not_abort_batch() {
    let (objects, index, ingestor) = setup().await;
    objects
        .put(&Path::parse("logs/bad.json").unwrap(), PutPayload::from_static(b"{truncated"))
        .await
        .unwrap();
    put(
        &objects,
        "logs/good.json",
        &json!({"requestId": "r3", "headers": {"x-llm-source": "proj1"}}),
    )
    .await;

    let summary = ingestor
        .handle_batch(&batch(&["logs/missing.json", "logs/bad.json", "logs/good.json"]))
        .await;
    assert_eq!(summary, IngestSummary { processed: 3, written: 1, skipped: 0, errors: 2 });
    assert_eq!(index.query_by_project("proj1", 10).unwrap().len(), 1);
}

#[tokio::test]
async fn test_non_object_store_records_ignored() {
    let (_, _, ingestor) = setup().await;
    let batch: EventBatch = serde_json::from_value(json!({
        "Records": [{"eventSource": "aws:sqs", "body": "{}"}]
    }))
    .unwrap();

    let summary = ingestor.handle_batch(&batch).await;
    assert_eq!(summary, IngestSummary::default());
}

#[tokio::test]
async fn test_sparse_projections_and_ordering() {
    let (objects, index, ingestor) = setup().await;
    put(
        &objects,
        "logs/a.json",
        &json!({
            "requestId": "a",
            "timestamp": "2024-03-01T10:00:00Z",
            "headers": {"x-llm-source": "proj1", "x-llm-user": "NULL"},
            "statusCode": 500
        }),
    )
    .await;
    put(
        &objects,
        "logs/b.json",
        &json!({
            "requestId": "b",
            "timestamp": "2024-03-02T10:00:00+01:00",
            "headers": {"x-llm-source": "proj2", "x-llm-user": "u9"},
            "statusCode": "500"
        }),
    )
    .await;
    put(
        &objects,
        "logs/c.json",
        &json!({
            "requestId": "c",
            "timestamp": "2024-03-03T10:00:00Z",
            "headers": {"x-llm-source": "proj1", "x-llm-user": "u9"}
        }),
    )
    .await;

    let summary = ingestor
        .handle_batch(&batch(&["logs/a.json", "logs/b.json", "logs/c.json"]))
        .await;
    assert_eq!(summary.written, 3);

    let ids = |records: Vec<audit_ingest::IndexRecord>| -> Vec<String> {
        records.into_iter().map(|r| r.request_id).collect()
    };
    assert_eq!(ids(index.query_by_status(500, 10).unwrap()), ["b", "a"]);
    assert_eq!(ids(index.query_by_user("u9", 10).unwrap()), ["c", "b"]);
    assert_eq!(ids(index.query_by_project("proj1", 1).unwrap()), ["c"]);
}

#[tokio::test]
async fn test_reingesting_same_object_is_idempotent() {
    let (objects, index, ingestor) = setup().await;
    put(
        &objects,
        "logs/r1.json",
        &json!({"requestId": "r1", "timestamp": "2024-01-01T00:00:00Z", "headers": {"x-llm-source": "proj1"}}),
    )
    .await;

    ingestor.handle_batch(&batch(&["logs/r1.json"])).await;
    ingestor.handle_batch(&batch(&["logs/r1.json"])).await;
    assert_eq!(index.query_by_project("proj1", 10).unwrap().len(), 1);
}

#[tokio::test]
async fn test_object_key_with_reserved_characters() {
    let (objects, index, ingestor) = setup().await;
    let key = "logs/2024/01/01/req#1~a.json";
    put(
        &objects,
        key,
        &json!({"requestId": "req#1~a", "headers": {"x-llm-source": "proj1"}}),
    )
    .await;

    let summary = ingestor.handle_batch(&batch(&[key])).await;
    assert_eq!(summary.written, 1);

    let records = index.query_by_project("proj1", 10).unwrap();
    assert_eq!(records[0].request_id, "req#1~a");
    assert_eq!(records[0].audit_object_key, key);
}
