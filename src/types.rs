use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Model identifier in `app.Model` form, e.g. `"blog.Article"`.
pub type ModelId = String;

/// Identifier of a record in the backing store, as used for the search
/// document `_id`. Integer keys are carried in their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

impl From<i64> for RecordId {
    fn from(i: i64) -> Self {
        RecordId(i.to_string())
    }
}

impl From<i32> for RecordId {
    fn from(i: i32) -> Self {
        RecordId(i.to_string())
    }
}

/// The three operations the orchestrator can dispatch to an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Index,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Index => "index",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A JSON-compatible value stored in a [`DocumentBody`].
///
/// Variant order matters for untagged deserialization: integers are tried
/// before floats so `5` stays an integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Array(Vec<FieldValue>),
    Object(IndexMap<String, FieldValue>),
}

impl FieldValue {
    pub fn from_json(val: &serde_json::Value) -> Self {
        match val {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            serde_json::Value::Array(arr) => {
                FieldValue::Array(arr.iter().map(FieldValue::from_json).collect())
            }
            serde_json::Value::Object(obj) => FieldValue::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Integer(i) => serde_json::json!(i),
            FieldValue::Float(f) => serde_json::json!(f),
            FieldValue::Text(s) => serde_json::Value::String(s.clone()),
            FieldValue::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(FieldValue::to_json).collect())
            }
            FieldValue::Object(obj) => {
                let mut map = serde_json::Map::new();
                for (k, v) in obj {
                    map.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Same value with object keys sorted recursively, used for fingerprints.
    fn canonical_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Object(obj) => {
                let mut keys: Vec<&String> = obj.keys().collect();
                keys.sort();
                let mut map = serde_json::Map::new();
                for k in keys {
                    map.insert(k.clone(), obj[k].canonical_json());
                }
                serde_json::Value::Object(map)
            }
            FieldValue::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(FieldValue::canonical_json).collect())
            }
            other => other.to_json(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Integer(i.into())
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

/// The body of a search document: an ordered mapping of field names to values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentBody(IndexMap<String, FieldValue>);

impl DocumentBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a body from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::Json`] if `json` is not an object.
    pub fn from_json(json: &serde_json::Value) -> crate::Result<Self> {
        let obj = json
            .as_object()
            .ok_or_else(|| crate::SyncError::Json("Expected JSON object".to_string()))?;
        Ok(DocumentBody(
            obj.iter()
                .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                .collect(),
        ))
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (k, v) in &self.0 {
            map.insert(k.clone(), v.to_json());
        }
        serde_json::Value::Object(map)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(field.into(), value.into());
    }

    /// Builder-style [`DocumentBody::insert`].
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    /// SHA-256 of the key-sorted serialization, hex encoded. Two bodies with
    /// the same fields and values share a fingerprint regardless of field order.
    pub fn fingerprint(&self) -> String {
        let mut keys: Vec<&String> = self.0.keys().collect();
        keys.sort();
        let mut map = serde_json::Map::new();
        for k in keys {
            map.insert(k.clone(), self.0[k].canonical_json());
        }
        let bytes = serde_json::to_vec(&serde_json::Value::Object(map)).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

impl FromIterator<(String, FieldValue)> for DocumentBody {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        DocumentBody(iter.into_iter().collect())
    }
}

impl IntoIterator for DocumentBody {
    type Item = (String, FieldValue);
    type IntoIter = indexmap::map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A single record change headed for one index. Transient: built by the
/// orchestrator per target index and consumed immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub record_id: RecordId,
    pub model_id: ModelId,
    pub index: String,
    pub kind: OperationKind,
    pub changed_fields: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

impl SyncEvent {
    pub fn new(
        record_id: RecordId,
        model_id: &str,
        index: &str,
        kind: OperationKind,
        changed_fields: Option<Vec<String>>,
    ) -> Self {
        SyncEvent {
            record_id,
            model_id: model_id.to_string(),
            index: index.to_string(),
            kind,
            changed_fields,
            timestamp: Utc::now(),
        }
    }
}
