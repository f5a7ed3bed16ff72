use std::fmt;

use serde::{Deserialize, Serialize};

/// How an object (or the table root) treats keys that are not declared columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnPolicy {
    /// Unknown keys fail the write
    Strict,
    /// Unknown keys become new columns
    Dynamic,
    /// Unknown keys are stored but never become columns or search fields
    Ignored,
}

impl ColumnPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnPolicy::Strict => "STRICT",
            ColumnPolicy::Dynamic => "DYNAMIC",
            ColumnPolicy::Ignored => "IGNORED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Some(ColumnPolicy::Strict),
            "dynamic" => Some(ColumnPolicy::Dynamic),
            "ignored" => Some(ColumnPolicy::Ignored),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
