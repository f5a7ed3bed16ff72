//! Identifiers for tables and columns

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable column identifier.
///
/// Assigned once by the metadata coordinator and never reused within a table,
/// not even after the column is dropped. Stored documents are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId(u64);

impl ColumnId {
    /// Marker carried by proposals before the coordinator assigns a real id
    pub const UNASSIGNED: ColumnId = ColumnId(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }

    /// Key under which the column's value is stored
    pub fn storage_key(&self) -> String {
        self.0.to_string()
    }

    pub fn from_storage_key(key: &str) -> Option<Self> {
        key.parse::<u64>().ok().filter(|id| *id != 0).map(ColumnId)
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Namespace-qualified table identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId {
    namespace: String,
    table_name: String,
}

impl TableId {
    pub fn new(namespace: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            table_name: table_name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.table_name)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.table_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_id_storage_key() {
        let id = ColumnId::new(42);
        assert_eq!(id.storage_key(), "42");
        assert_eq!(ColumnId::from_storage_key("42"), Some(id));
        assert_eq!(ColumnId::from_storage_key("0"), None);
        assert_eq!(ColumnId::from_storage_key("_u_name"), None);
        assert!(!ColumnId::UNASSIGNED.is_assigned());
    }

    #[test]
    fn test_table_id_display() {
        let table_id = TableId::new("app", "events");
        assert_eq!(table_id.to_string(), "app.events");
        assert_eq!(table_id.full_name(), "app.events");
    }
}
