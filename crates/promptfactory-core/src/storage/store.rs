use crate::config::DEFAULT_MAX_DOCUMENT_BYTES;
use anyhow::Context;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Key-value document store over SQLite. Every write is size-checked
/// against `max_document_bytes` first.
#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
    max_document_bytes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub schema_version: i64,
    pub payload: serde_json::Value,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SaveOutcome {
    Written { bytes: usize },
    SkippedOverQuota { bytes: usize, limit: usize },
}

impl SaveOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, SaveOutcome::Written { .. })
    }
}

pub struct StoreStats {
    pub documents: u64,
    pub total_bytes: u64,
    pub last_updated_at: Option<String>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
        })
    }

    pub fn with_quota(mut self, max_document_bytes: usize) -> Self {
        self.max_document_bytes = max_document_bytes;
        self
    }

    pub fn max_document_bytes(&self) -> usize {
        self.max_document_bytes
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("storage connection lock poisoned"))
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    pub fn get_document(&self, key: &str) -> anyhow::Result<Option<StoredDocument>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT schema_version, payload_json, updated_at FROM documents WHERE key=?1",
        )?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            let schema_version: i64 = row.get(0)?;
            let payload_json: String = row.get(1)?;
            let updated_at: String = row.get(2)?;
            let payload = serde_json::from_str(&payload_json)
                .with_context(|| format!("document '{}' is not valid JSON", key))?;
            Ok(Some(StoredDocument {
                schema_version,
                payload,
                updated_at,
            }))
        } else {
            Ok(None)
        }
    }

    /// Serializes and writes a document unless it exceeds the quota, in which
    /// case the previous value stays in place.
    pub fn put_document<T: Serialize>(
        &self,
        key: &str,
        schema_version: i64,
        doc: &T,
    ) -> anyhow::Result<SaveOutcome> {
        let payload = serde_json::to_string(doc)
            .with_context(|| format!("failed to serialize document '{}'", key))?;
        let bytes = payload.len();

        if bytes > self.max_document_bytes {
            tracing::warn!(
                event = "promptfactory.storage.quota_exceeded",
                key,
                bytes,
                limit = self.max_document_bytes,
                "document exceeds storage quota; write skipped"
            );
            return Ok(SaveOutcome::SkippedOverQuota {
                bytes,
                limit: self.max_document_bytes,
            });
        }

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents(key, schema_version, payload_json, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET schema_version=excluded.schema_version,
               payload_json=excluded.payload_json, updated_at=excluded.updated_at",
            params![key, schema_version, payload, crate::model::now_rfc3339()],
        )?;
        tracing::debug!(event = "promptfactory.storage.written", key, bytes);
        Ok(SaveOutcome::Written { bytes })
    }

    pub fn delete_document(&self, key: &str) -> anyhow::Result<bool> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM documents WHERE key=?1", params![key])?;
        Ok(n > 0)
    }

    pub fn keys(&self) -> anyhow::Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM documents ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn stats(&self) -> anyhow::Result<StoreStats> {
        let conn = self.lock()?;
        let (documents, total_bytes, last_updated_at) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(payload_json)), 0), MAX(updated_at) FROM documents",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )?;
        Ok(StoreStats {
            documents: documents as u64,
            total_bytes: total_bytes as u64,
            last_updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> Store {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        s
    }

    #[test]
    fn test_put_get_overwrite() {
        let s = store();
        assert!(s.get_document("a").unwrap().is_none());

        let out = s.put_document("a", 2, &json!({"x": 1})).unwrap();
        assert!(out.is_written());
        let out = s.put_document("a", 2, &json!({"x": 2})).unwrap();
        assert!(out.is_written());

        let doc = s.get_document("a").unwrap().unwrap();
        assert_eq!(doc.payload, json!({"x": 2}));
        assert_eq!(doc.schema_version, 2);
        assert_eq!(s.keys().unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn test_oversize_write_is_skipped_and_keeps_previous() {
        let s = store().with_quota(16);
        assert!(s.put_document("a", 1, &json!({"k": "v"})).unwrap().is_written());

        let big = json!({"k": "x".repeat(64)});
        match s.put_document("a", 1, &big).unwrap() {
            SaveOutcome::SkippedOverQuota { bytes, limit } => {
                assert!(bytes > 16);
                assert_eq!(limit, 16);
            }
            other => panic!("expected skip, got {:?}", other),
        }
        assert_eq!(
            s.get_document("a").unwrap().unwrap().payload,
            json!({"k": "v"})
        );
    }

    #[test]
    fn test_delete_and_stats() {
        let s = store();
        assert!(s.put_document("a", 1, &json!([1, 2])).unwrap().is_written());
        assert!(s.put_document("b", 1, &json!("hello")).unwrap().is_written());
        let stats = s.stats().unwrap();
        assert_eq!(stats.documents, 2);
        assert!(stats.total_bytes > 0);
        assert!(stats.last_updated_at.is_some());

        assert!(s.delete_document("a").unwrap());
        assert!(!s.delete_document("a").unwrap());
        assert_eq!(s.stats().unwrap().documents, 1);
    }
}
