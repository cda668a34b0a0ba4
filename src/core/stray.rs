//! Best-effort field extraction from arbitrary values
//!
//! Used on the fallback path (a message that could not render itself)
//! and when producers attach loose serializable values to a generic
//! message. The inspector walks a JSON representation depth-limited to
//! guard against self-referential values, collecting field names, value
//! kinds and anything that looks like an identifier. Extraction
//! failures contribute no fields; they never error.

use serde::Serialize;
use serde_json::Value;

use super::fields::{FieldReporter, FieldValue};

const MAX_DEPTH: usize = 10;

/// Accumulated loose fields from values outside the field model.
#[derive(Debug, Default)]
pub struct StrayFields {
    fields: Vec<String>,
    types: Vec<String>,
    ids: Vec<String>,
    id_values: Vec<String>,
    dumps: Vec<Value>,
}

impl StrayFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect a serializable value. Serialization failure is ignored.
    pub fn add<T: Serialize>(&mut self, value: &T) {
        self.types.push(short_type_name::<T>());
        if let Ok(json) = serde_json::to_value(value) {
            self.inspect(&json, 0);
            self.dumps.push(json);
        }
    }

    /// Inspect an already-converted JSON value under a type label.
    pub fn add_value(&mut self, type_label: &str, json: &Value) {
        self.types.push(type_label.to_string());
        self.inspect(json, 0);
        self.dumps.push(json.clone());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.types.is_empty() && self.dumps.is_empty()
    }

    fn inspect(&mut self, value: &Value, depth: usize) {
        if depth > MAX_DEPTH {
            return;
        }
        match value {
            Value::Object(map) => {
                for (key, inner) in map {
                    self.fields.push(key.clone());
                    self.types.push(kind_name(inner).to_string());
                    self.note_id(key, inner);
                    self.inspect(inner, depth + 1);
                }
            }
            Value::Array(items) => {
                for inner in items {
                    self.inspect(inner, depth + 1);
                }
            }
            _ => {}
        }
    }

    fn note_id(&mut self, key: &str, value: &Value) {
        if !key.to_lowercase().contains("id") {
            return;
        }
        self.ids.push(key.to_string());
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.id_values.push(rendered);
    }
}

impl FieldReporter for StrayFields {
    fn each_field(&self, f: &mut dyn FnMut(&str, FieldValue)) {
        if !self.fields.is_empty() {
            f("fields", FieldValue::from(join_deduped(&self.fields)));
        }
        if !self.types.is_empty() {
            f("types", FieldValue::from(join_deduped(&self.types)));
        }
        if !self.ids.is_empty() {
            f("ids", FieldValue::from(join_deduped(&self.ids)));
        }
        if !self.id_values.is_empty() {
            f("id-values", FieldValue::from(join_deduped(&self.id_values)));
        }
        if !self.dumps.is_empty() {
            let json = Value::Array(self.dumps.clone()).to_string();
            f("json-value", FieldValue::from(json));
        }
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full).to_string()
}

fn join_deduped(elements: &[String]) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for e in elements {
        if e.is_empty() {
            continue;
        }
        if seen.insert(e.as_str()) {
            out.push(e.as_str());
        }
    }
    out.join(",")
}
