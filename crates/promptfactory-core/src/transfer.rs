//! Single-version download/upload files.

use crate::errors::ImportError;
use crate::migrate;
use crate::model::{new_id, SavedVersion};
use crate::versions::VersionStore;
use anyhow::Context;
use jsonschema::JSONSchema;
use serde_json::{json, Value};

const IMPORTED_SUFFIX: &str = " (imported)";

fn version_file_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name", "data"],
        "properties": {
            "id": { "type": "string" },
            "name": { "type": "string" },
            "savedAt": { "type": ["string", "integer"] },
            "expanded": { "type": "boolean" },
            "modelAccuracy": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["model", "accuracy"],
                    "properties": {
                        "model": { "type": "string" },
                        "accuracy": { "type": "number" }
                    }
                }
            },
            "data": {
                "type": "object",
                "properties": {
                    "systemPrompt": { "type": ["object", "string"] },
                    "isSystemPromptOn": { "type": ["object", "boolean"] },
                    "hintMessages": { "type": "array" },
                    "parameters": { "type": "object" },
                    "models": { "type": "array", "items": { "type": "string" } },
                    "model": { "type": ["string", "array"] },
                    "tools": { "type": "array", "items": { "type": "string" } }
                }
            }
        }
    })
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub version: SavedVersion,
    /// The file's id was already taken and a fresh one was assigned.
    pub id_reassigned: bool,
    /// The name was suffixed to keep it unique.
    pub renamed: bool,
    /// An existing version with byte-identical `data`.
    pub duplicate_of: Option<String>,
}

pub fn export_version(version: &SavedVersion) -> anyhow::Result<String> {
    serde_json::to_string_pretty(version)
        .with_context(|| format!("failed to serialize version '{}'", version.name))
}

/// Parses and validates a version file without touching any store.
pub fn parse_version_file(raw: &str) -> Result<SavedVersion, ImportError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ImportError::Malformed(e.to_string()))?;
    let Some(obj) = value.as_object() else {
        return Err(ImportError::Malformed("expected a JSON object".into()));
    };
    for field in ["name", "data"] {
        if !obj.contains_key(field) {
            return Err(ImportError::MissingField(field.to_string()));
        }
    }

    let schema = version_file_schema();
    let compiled = JSONSchema::compile(&schema)
        .map_err(|e| ImportError::SchemaViolation(vec![format!("schema compile failed: {e}")]))?;
    if let Err(errors) = compiled.validate(&value) {
        let violations: Vec<String> = errors
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect();
        return Err(ImportError::SchemaViolation(violations));
    }

    let mut value = value;
    migrate::upgrade_version(&mut value);
    serde_json::from_value(value).map_err(|e| ImportError::SchemaViolation(vec![e.to_string()]))
}

fn unique_import_name(store: &VersionStore, base: &str) -> String {
    let first = format!("{base}{IMPORTED_SUFFIX}");
    if !store.name_exists(&first) {
        return first;
    }
    (2..)
        .map(|n| format!("{base} (imported {n})"))
        .find(|candidate| !store.name_exists(candidate))
        .unwrap_or(first)
}

/// Adds a parsed version to the store. Existing versions are never
/// overwritten: a taken id is replaced, and a taken id or name gets an
/// "(imported)" suffix.
pub fn import_into(store: &mut VersionStore, mut version: SavedVersion) -> ImportReport {
    let id_taken = store.get(&version.id).is_some();
    let name_taken = store.name_exists(&version.name);

    if id_taken {
        version.id = new_id();
    }
    if id_taken || name_taken {
        version.name = unique_import_name(store, &version.name);
    }
    version.expanded = false;
    for entry in &mut version.model_accuracy {
        entry.accuracy = entry.accuracy.clamp(0.0, 100.0);
    }

    let fingerprint = version.fingerprint();
    let duplicate_of = store
        .list()
        .iter()
        .find(|v| v.fingerprint() == fingerprint)
        .map(|v| v.id.clone());
    if let Some(existing) = &duplicate_of {
        tracing::info!(
            event = "promptfactory.import.duplicate_content",
            existing = %existing,
            fingerprint = %fingerprint,
            "imported version has the same content as an existing one"
        );
    }

    store.insert_front(version.clone());
    ImportReport {
        version,
        id_reassigned: id_taken,
        renamed: id_taken || name_taken,
        duplicate_of,
    }
}

pub fn import_version(store: &mut VersionStore, raw: &str) -> Result<ImportReport, ImportError> {
    let version = parse_version_file(raw)?;
    Ok(import_into(store, version))
}
