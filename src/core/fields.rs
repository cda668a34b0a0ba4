//! The field model: how any value contributes named fields to a message
//!
//! This module provides:
//! - `FieldValue`: the value type carried by structured fields
//! - `FieldReporter`: the capability by which a value enumerates its fields
//! - `Kv`: a quick single-pair reporter
//! - `FieldSet`: the merged, ordered view a sink assembles before writing

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value type for structured fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

impl FieldValue {
    /// Convert to serde_json::Value for the JSON writer format
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
            FieldValue::Int(i) => serde_json::Value::Number((*i).into()),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Null => serde_json::Value::Null,
        }
    }

    /// The string slice, if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i as i64)
    }
}

impl From<u32> for FieldValue {
    fn from(i: u32) -> Self {
        FieldValue::Int(i as i64)
    }
}

impl From<u64> for FieldValue {
    fn from(i: u64) -> Self {
        FieldValue::Int(i as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// The enumeration contract by which any value exposes its named fields.
///
/// Calling `each_field` must be side-effect-free and tolerate being
/// invoked repeatedly; the order of fields is chosen by the reporter.
/// Duplicate names across composed reporters are all delivered; the
/// sink's merge is last-write-wins.
pub trait FieldReporter {
    fn each_field(&self, f: &mut dyn FnMut(&str, FieldValue));
}

/// A single-pair reporter, for on-the-spot extra fields.
#[derive(Debug, Clone)]
pub struct Kv {
    name: String,
    value: FieldValue,
}

/// Creates a single-entry reporter with the given name and value.
pub fn kv(name: impl Into<String>, value: impl Into<FieldValue>) -> Kv {
    Kv {
        name: name.into(),
        value: value.into(),
    }
}

impl FieldReporter for Kv {
    fn each_field(&self, f: &mut dyn FnMut(&str, FieldValue)) {
        f(&self.name, self.value.clone());
    }
}

impl<T: FieldReporter + ?Sized> FieldReporter for &T {
    fn each_field(&self, f: &mut dyn FnMut(&str, FieldValue)) {
        (**self).each_field(f);
    }
}

impl FieldReporter for Vec<Kv> {
    fn each_field(&self, f: &mut dyn FnMut(&str, FieldValue)) {
        for pair in self {
            pair.each_field(f);
        }
    }
}

/// An ordered, merged collection of named fields.
///
/// Insertion is last-write-wins on the value but keeps the position of
/// the first occurrence, so ambient fields stay grouped at the front of
/// a rendered line while still being overridable by message fields.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    entries: Vec<(String, FieldValue)>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Run a reporter, merging everything it reports.
    pub fn absorb(&mut self, reporter: &dyn FieldReporter) {
        reporter.each_field(&mut |name, value| self.insert(name, value));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Render the whole set as one JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        for (name, value) in self.iter() {
            obj.insert(name.to_string(), value.to_json_value());
        }
        serde_json::Value::Object(obj)
    }
}

impl FieldReporter for FieldSet {
    fn each_field(&self, f: &mut dyn FnMut(&str, FieldValue)) {
        for (name, value) in self.iter() {
            f(name, value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_reports_single_pair() {
        let pair = kv("user-id", 123);
        let mut seen = Vec::new();
        pair.each_field(&mut |n, v| seen.push((n.to_string(), v)));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "user-id");
        assert_eq!(seen[0].1, FieldValue::Int(123));
    }

    #[test]
    fn test_fieldset_last_write_wins() {
        let mut set = FieldSet::new();
        set.insert("override", 2);
        set.insert("other", "x");
        set.insert("override", 20);

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("override"), Some(&FieldValue::Int(20)));
    }

    #[test]
    fn test_fieldset_preserves_first_position() {
        let mut set = FieldSet::new();
        set.insert("a", 1);
        set.insert("b", 2);
        set.insert("a", 3);

        let names: Vec<&str> = set.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_fieldset_absorb() {
        let mut set = FieldSet::new();
        set.absorb(&kv("k", "v"));
        assert_eq!(set.get("k"), Some(&FieldValue::String("v".into())));
    }

    #[test]
    fn test_fieldset_to_json() {
        let mut set = FieldSet::new();
        set.insert("name", "alice");
        set.insert("count", 5);
        let json = set.to_json();
        assert_eq!(json["name"], "alice");
        assert_eq!(json["count"], 5);
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::from("x").to_string(), "x");
        assert_eq!(FieldValue::Int(7).to_string(), "7");
        assert_eq!(FieldValue::Bool(false).to_string(), "false");
        assert_eq!(FieldValue::Null.to_string(), "null");
    }
}
