use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection};

use super::{IndexStore, StoreError};
use crate::record::IndexRecord;

/// SQLite-backed index store.
///
/// Each record is one row keyed by `(id, created_at)` with the sparse item
/// stored as JSON. Secondary access paths are partial expression indexes over
/// the projection attributes, so rows without an attribute stay out of that
/// index.
pub struct SqliteIndexStore {
    conn: Mutex<Connection>,
}

impl SqliteIndexStore {
    pub fn new(database_url: &str) -> Result<Self, StoreError> {
        // Parse sqlite: prefix if present
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

        // Create parent directories if needed
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::IoError(e.to_string()))?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_index (
                id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                item TEXT NOT NULL,
                PRIMARY KEY (id, created_at)
            );
            CREATE INDEX IF NOT EXISTS idx_audit_index_user
                ON audit_index (json_extract(item, '$.userIdPk'), json_extract(item, '$.userIdSk'))
                WHERE json_extract(item, '$.userIdPk') IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_audit_index_status
                ON audit_index (json_extract(item, '$.statusPk'), json_extract(item, '$.statusSk'))
                WHERE json_extract(item, '$.statusPk') IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_audit_index_latency
                ON audit_index (json_extract(item, '$.latencyPk'), json_extract(item, '$.latencyMs'))
                WHERE json_extract(item, '$.latencyPk') IS NOT NULL;",
        )
        .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        tracing::info!("Index store initialized with database: {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Records of a project, newest first.
    pub fn query_by_project(&self, project: &str, limit: usize) -> Result<Vec<IndexRecord>, StoreError> {
        self.query(
            "SELECT item FROM audit_index WHERE id = ?1 ORDER BY created_at DESC LIMIT ?2",
            &format!("project#{}", project),
            limit,
        )
    }

    /// Records of a user across projects, newest first.
    pub fn query_by_user(&self, user: &str, limit: usize) -> Result<Vec<IndexRecord>, StoreError> {
        self.query(
            "SELECT item FROM audit_index
             WHERE json_extract(item, '$.userIdPk') = ?1
             ORDER BY json_extract(item, '$.userIdSk') DESC LIMIT ?2",
            &format!("user#{}", user),
            limit,
        )
    }

    /// Records with a given backend status across projects, newest first.
    pub fn query_by_status(&self, status: i64, limit: usize) -> Result<Vec<IndexRecord>, StoreError> {
        self.query(
            "SELECT item FROM audit_index
             WHERE json_extract(item, '$.statusPk') = ?1
             ORDER BY json_extract(item, '$.statusSk') DESC LIMIT ?2",
            &format!("status#{}", status),
            limit,
        )
    }

    /// Latencies recorded for a project, slowest first.
    pub fn latencies_for_project(&self, project: &str, limit: usize) -> Result<Vec<(String, i64)>, StoreError> {
        let conn = self.conn.lock()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT json_extract(item, '$.requestId'), json_extract(item, '$.latencyMs')
                 FROM audit_index
                 WHERE json_extract(item, '$.latencyPk') = ?1
                 ORDER BY json_extract(item, '$.latencyMs') DESC LIMIT ?2",
            )
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        let rows = stmt
            .query_map(params![format!("project#{}", project), limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        let latencies = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(latencies)
    }

    fn query(&self, sql: &str, key: &str, limit: usize) -> Result<Vec<IndexRecord>, StoreError> {
        let conn = self.conn.lock()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        let items = stmt
            .query_map(params![key, limit as i64], |row| row.get::<_, String>(0))
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        items
            .iter()
            .map(|item| serde_json::from_str(item).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn put_item(&self, record: &IndexRecord) -> Result<(), StoreError> {
        let item = serde_json::to_string(&record.to_item()?)?;

        let conn = self.conn.lock()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO audit_index (id, created_at, item) VALUES (?1, ?2, ?3)",
            params![record.id, record.created_at, item],
        ).map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        tracing::debug!("Indexed request {} under {}", record.request_id, record.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(request_id: &str, ts: &str, project: &str, user: Option<&str>, status: Option<i64>) -> IndexRecord {
        let mut headers = json!({"x-llm-source": project});
        if let Some(user) = user {
            headers["x-llm-user"] = json!(user);
        }
        let mut doc = json!({
            "requestId": request_id,
            "timestamp": ts,
            "headers": headers,
            "latencyMs": 10,
        });
        if let Some(status) = status {
            doc["statusCode"] = json!(status);
        }
        IndexRecord::from_document(&doc, "audits", &format!("logs/{}.json", request_id), 2048).unwrap()
    }

    #[tokio::test]
    async fn test_put_and_query_by_project() {
        let store = SqliteIndexStore::new(":memory:").unwrap();
        store.put_item(&record("r1", "2024-01-01T00:00:00Z", "p1", None, Some(200))).await.unwrap();
        store.put_item(&record("r2", "2024-01-02T00:00:00Z", "p1", None, Some(200))).await.unwrap();
        store.put_item(&record("r3", "2024-01-03T00:00:00Z", "p2", None, Some(200))).await.unwrap();

        let records = store.query_by_project("p1", 10).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.request_id.as_str()).collect();
        assert_eq!(ids, ["r2", "r1"]);
    }

    #[tokio::test]
    async fn test_put_is_upsert_by_primary_key() {
        let store = SqliteIndexStore::new(":memory:").unwrap();
        let first = record("r1", "2024-01-01T00:00:00Z", "p1", None, Some(500));
        let mut second = first.clone();
        second.response_preview = Some("retry".to_string());

        store.put_item(&first).await.unwrap();
        store.put_item(&second).await.unwrap();

        let records = store.query_by_project("p1", 10).unwrap();
        assert_eq!(records, vec![second]);
    }

    #[tokio::test]
    async fn test_secondary_indexes_only_hold_projected_items() {
        let store = SqliteIndexStore::new(":memory:").unwrap();
        store.put_item(&record("r1", "2024-01-01T00:00:00Z", "p1", Some("u1"), Some(200))).await.unwrap();
        store.put_item(&record("r2", "2024-01-02T00:00:00Z", "p2", Some("u1"), None)).await.unwrap();
        store.put_item(&record("r3", "2024-01-03T00:00:00Z", "p1", None, Some(200))).await.unwrap();

        let by_user: Vec<_> = store.query_by_user("u1", 10).unwrap()
            .into_iter().map(|r| r.request_id).collect();
        assert_eq!(by_user, ["r2", "r1"]);

        let by_status: Vec<_> = store.query_by_status(200, 10).unwrap()
            .into_iter().map(|r| r.request_id).collect();
        assert_eq!(by_status, ["r3", "r1"]);

        let latencies = store.latencies_for_project("p1", 10).unwrap();
        assert_eq!(latencies.len(), 2);
        assert!(latencies.iter().all(|(_, ms)| *ms == 10));
    }

    #[tokio::test]
    async fn test_file_backed_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/index.db");
        let url = format!("sqlite:{}", path.display());

        let store = SqliteIndexStore::new(&url).unwrap();
        store.put_item(&record("r1", "2024-01-01T00:00:00Z", "p1", None, None)).await.unwrap();
        drop(store);

        let reopened = SqliteIndexStore::new(&url).unwrap();
        assert_eq!(reopened.query_by_project("p1", 10).unwrap().len(), 1);
    }
}
