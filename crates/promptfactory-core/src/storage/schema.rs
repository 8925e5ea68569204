pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
  key TEXT PRIMARY KEY,
  schema_version INTEGER NOT NULL,
  payload_json TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
"#;

/// Layout version written alongside every document payload.
pub const DOCUMENT_SCHEMA_VERSION: i64 = 2;
