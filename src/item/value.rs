//! Payload values and items

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single payload value.
///
/// Serialized with an explicit type tag so integers, floats and timestamps
/// survive the trip through the flat string hash unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Timestamp(_) => "timestamp",
            Value::Object(_) => "object",
        }
    }

    /// Sorted-index score.
    ///
    /// Timestamps score by their epoch-nanosecond magnitude. Non-numeric
    /// values have no score.
    pub fn score(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Timestamp(t) => Some(timestamp_score(t)),
            Value::String(_) | Value::Boolean(_) | Value::Object(_) => None,
        }
    }

    /// Token naming this value's discrete index. Objects have none.
    pub fn index_token(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Timestamp(t) => Some(t.to_rfc3339()),
            Value::Object(_) => None,
        }
    }

    /// Text stored in the flattened hash field read by a server-side sort.
    ///
    /// Numeric types are written so a numeric sort parses them; timestamps
    /// as epoch nanoseconds.
    pub fn sort_token(&self) -> Option<String> {
        match self {
            Value::Timestamp(t) => Some(match t.timestamp_nanos_opt() {
                Some(n) => n.to_string(),
                None => timestamp_score(t).to_string(),
            }),
            other => other.index_token(),
        }
    }
}

fn timestamp_score(t: &DateTime<Utc>) -> f64 {
    match t.timestamp_nanos_opt() {
        Some(n) => n as f64,
        None => t.timestamp() as f64 * 1e9 + t.timestamp_subsec_nanos() as f64,
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

/// A stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Identity, unique per entity
    pub id: String,
    /// Opaque version token
    pub etag: String,
    /// Last modification time
    pub updated: DateTime<Utc>,
    /// Field values
    pub payload: BTreeMap<String, Value>,
}

impl Item {
    /// Creates an item with an empty payload, updated now
    pub fn new(id: impl Into<String>, etag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            etag: etag.into(),
            updated: Utc::now(),
            payload: BTreeMap::new(),
        }
    }

    /// Sets the modification time
    pub fn with_updated(mut self, updated: DateTime<Utc>) -> Self {
        self.updated = updated;
        self
    }

    /// Sets a payload field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(name.into(), value.into());
        self
    }

    /// Returns a payload field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }
}
