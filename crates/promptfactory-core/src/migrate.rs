//! Load-time upgrades for persisted documents and version files.
//!
//! Everything here works on raw JSON before it is decoded into typed
//! structures, so the typed layer never has to tolerate legacy shapes.

use crate::model::new_id;
use serde_json::{Map, Value};

/// Strips a `{ "state": {...}, "version": n }` persistence envelope.
pub fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut obj)
            if obj.len() <= 2 && obj.get("state").is_some_and(Value::is_object) =>
        {
            obj.remove("state").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Hint lists were once plain strings.
fn upgrade_hints(hints: &mut Value) {
    let Some(items) = hints.as_array_mut() else {
        *hints = Value::Array(Vec::new());
        return;
    };
    for item in items.iter_mut() {
        if let Value::String(text) = item {
            let mut obj = Map::new();
            obj.insert("id".into(), Value::String(new_id()));
            obj.insert("content".into(), Value::String(std::mem::take(text)));
            *item = Value::Object(obj);
        } else if let Some(obj) = item.as_object_mut() {
            if !obj.get("id").is_some_and(Value::is_string) {
                obj.insert("id".into(), Value::String(new_id()));
            }
        }
    }
}

/// A bare string system prompt predates the sectioned layout.
fn upgrade_system_prompt(obj: &mut Map<String, Value>) {
    if let Some(Value::String(text)) = obj.get("systemPrompt") {
        let mut sections = Map::new();
        sections.insert("characterSettings".into(), Value::String(text.clone()));
        obj.insert("systemPrompt".into(), Value::Object(sections));
    }
    // a single boolean switched every section at once
    if let Some(Value::Bool(on)) = obj.get("isSystemPromptOn") {
        let on = *on;
        let toggles: Map<String, Value> = crate::model::SystemPromptSection::ALL
            .iter()
            .map(|s| (s.key().to_string(), Value::Bool(on)))
            .collect();
        obj.insert("isSystemPromptOn".into(), Value::Object(toggles));
    }
}

fn upgrade_version_data(data: &mut Value) {
    let Some(obj) = data.as_object_mut() else {
        *data = Value::Object(Map::new());
        return;
    };

    if let Some(model) = obj.remove("model") {
        if !obj.contains_key("models") {
            let models = match model {
                Value::String(m) if !m.is_empty() => vec![Value::String(m)],
                Value::Array(ms) => ms,
                _ => Vec::new(),
            };
            obj.insert("models".into(), Value::Array(models));
        }
    }
    if let Some(hints) = obj.remove("hintMessage") {
        obj.entry("hintMessages").or_insert(hints);
    }
    if let Some(hints) = obj.get_mut("hintMessages") {
        upgrade_hints(hints);
    }
    upgrade_system_prompt(obj);
}

/// Brings one saved version up to the current shape. Missing identity
/// fields are filled so the typed decode cannot fail on them.
pub fn upgrade_version(version: &mut Value) {
    let Some(obj) = version.as_object_mut() else {
        return;
    };
    if !obj.get("id").is_some_and(Value::is_string) {
        obj.insert("id".into(), Value::String(new_id()));
    }
    if !obj.get("savedAt").is_some_and(Value::is_string) {
        // numeric epoch millis from older exports
        let saved_at = obj
            .get("savedAt")
            .and_then(Value::as_i64)
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(crate::model::now_rfc3339);
        obj.insert("savedAt".into(), Value::String(saved_at));
    }
    if !obj.get("name").is_some_and(Value::is_string) {
        obj.insert("name".into(), Value::String(String::new()));
    }
    match obj.get_mut("data") {
        Some(data) => upgrade_version_data(data),
        None => {
            obj.insert("data".into(), Value::Object(Map::new()));
        }
    }
}

/// Document A: editor state plus saved versions.
pub fn upgrade_prompt_document(value: Value) -> Value {
    let mut value = unwrap_envelope(value);
    let Some(obj) = value.as_object_mut() else {
        return Value::Object(Map::new());
    };

    if let Some(model) = obj.remove("selectedModel") {
        if let (Value::String(m), false) = (model, obj.contains_key("selectedModels")) {
            obj.insert("selectedModels".into(), Value::Array(vec![Value::String(m)]));
        }
    }
    if let Some(hints) = obj.get_mut("hintMessage") {
        upgrade_hints(hints);
    }
    upgrade_system_prompt(obj);

    if let Some(Value::Array(versions)) = obj.get_mut("savedVersions") {
        versions.retain(Value::is_object);
        versions.iter_mut().for_each(upgrade_version);
    }
    value
}

/// Document B: rating and analytics state.
pub fn upgrade_advanced_document(value: Value) -> Value {
    let mut value = unwrap_envelope(value);
    let Some(obj) = value.as_object_mut() else {
        return Value::Object(Map::new());
    };
    // scores were briefly stored as strings
    if let Some(Value::Object(by_version)) = obj.get_mut("versionRatings") {
        for by_model in by_version.values_mut().filter_map(Value::as_object_mut) {
            for by_rubric in by_model.values_mut().filter_map(Value::as_object_mut) {
                by_rubric.retain(|_, score| {
                    if score.is_number() {
                        return true;
                    }
                    let parsed = score
                        .as_str()
                        .and_then(|s| s.trim().parse::<f64>().ok())
                        .and_then(serde_json::Number::from_f64);
                    match parsed {
                        Some(n) => {
                            *score = Value::Number(n);
                            true
                        }
                        None => false,
                    }
                });
            }
        }
    }
    value
}
