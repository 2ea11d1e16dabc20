//! The transient key/value record that flows between pipeline stages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names shared by the AI prompts, the merged record and the CSV headers.
pub mod fields {
    pub const ID: &str = "id";
    pub const TITLE_ORIG: &str = "titleOrig";
    pub const TITLE_EN: &str = "titleEn";
    pub const ABSTRACT_ORIG: &str = "abstractOrig";
    pub const ABSTRACT_EN: &str = "abstractEn";
    pub const KEYWORDS_ORIG: &str = "keywordsOrig";
    pub const KEYWORDS_EN: &str = "keywordsEn";
    pub const DOI: &str = "doi";
    pub const LANGUAGE: &str = "language";
    pub const SECTION: &str = "section";
    pub const PAGE_FROM: &str = "pageFrom";
    pub const PAGE_TO: &str = "pageTo";
    pub const AUTHORS: &str = "authors";
    pub const REFERENCES: &str = "references";
}

/// A merged metadata record: AI extraction overlaid on the HTML partial.
///
/// Values stay untyped JSON until the record is promoted to an
/// [`Article`](crate::Article) by [`build`](crate::builder::build).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergedRecord(Map<String, Value>);

impl MergedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value. Returns `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Scalar value rendered as text. Absent, null and non-scalar values are empty.
    pub fn text(&self, key: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    /// Whether the field is absent or carries no content.
    pub fn is_blank(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(Value::Object(map)) => map.is_empty(),
            Some(_) => false,
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
