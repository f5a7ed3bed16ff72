//! Typed search fields handed to the search index

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Long(i64),
    Double(f64),
    Bool(bool),
    /// Exact-match term
    Keyword(String),
    /// Analyzed full-text token
    Text(String),
    /// Serialized value that is not individually addressable
    Blob(Vec<u8>),
}

/// One search-index entry. Names are column ids (or derived from them),
/// never column names, so renames do not touch indexed data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchField {
    pub name: String,
    pub value: FieldValue,
}

impl SearchField {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}
