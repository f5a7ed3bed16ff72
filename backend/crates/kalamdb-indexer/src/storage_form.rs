//! Canonical storage form
//!
//! Documents are keyed by column id (decimal string) at every nesting level.
//! Values of columns that are not committed yet carry the `_u_` prefix plus
//! their raw name. Values under IGNORED objects use the same prefix for good,
//! so a raw key can never land on a column id.
//! The binary form is bincode (standard config) over serde.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use kalamdb_schema::SystemColumns;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Array(Vec<StoredValue>),
    Object(Vec<(String, StoredValue)>),
}

/// How object keys of an untyped value are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UntypedKeys {
    /// Raw names, for comparing values outside the storage form
    Raw,
    /// `_u_` + raw name, for not-yet-committed DYNAMIC subtrees
    Unresolved,
}

impl StoredValue {
    /// Convert a JSON value without a schema type
    pub fn untyped(value: &Value, keys: UntypedKeys) -> StoredValue {
        match value {
            Value::Null => StoredValue::Null,
            Value::Bool(b) => StoredValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => StoredValue::Int(i),
                None => StoredValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => StoredValue::Text(s.clone()),
            Value::Array(items) => {
                StoredValue::Array(items.iter().map(|v| Self::untyped(v, keys)).collect())
            }
            Value::Object(map) => StoredValue::Object(
                map.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| {
                        let key = match keys {
                            UntypedKeys::Raw => k.clone(),
                            UntypedKeys::Unresolved => unresolved_key(k),
                        };
                        (key, Self::untyped(v, keys))
                    })
                    .collect(),
            ),
        }
    }

    /// JSON rendering that keeps stored keys as they are
    pub fn to_json(&self) -> Value {
        match self {
            StoredValue::Null => Value::Null,
            StoredValue::Bool(b) => Value::Bool(*b),
            StoredValue::Int(i) => Value::from(*i),
            StoredValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            StoredValue::Text(s) => Value::String(s.clone()),
            StoredValue::Array(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            StoredValue::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    pub fn get(&self, key: &str) -> Option<&StoredValue> {
        match self {
            StoredValue::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StoredValue::Null)
    }
}

pub fn unresolved_key(name: &str) -> String {
    format!("{}{}", SystemColumns::UNRESOLVED_PREFIX, name)
}

pub fn is_unresolved_key(key: &str) -> bool {
    key.starts_with(SystemColumns::UNRESOLVED_PREFIX)
}

/// Top-level stored document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageDocument {
    entries: Vec<(String, StoredValue)>,
}

impl StorageDocument {
    pub fn new(entries: Vec<(String, StoredValue)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, StoredValue)] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&StoredValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (document, _): (StorageDocument, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(document)
    }

    /// Stored keys rendered as a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}
