//! Error types for schema validation and mutation

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema errors
///
/// Everything except `TableNotFound` and `VersionNotFound` is a schema
/// violation: the proposed change (or row) is not admissible under the current
/// schema and must not be retried unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Limit of total columns [{limit}] in table [{table}] exceeded ({actual} columns)")]
    ColumnLimitExceeded {
        table: String,
        limit: usize,
        actual: usize,
    },

    #[error("Limit of object depth [{limit}] exceeded by column `{column}` (depth {depth})")]
    DepthLimitExceeded {
        column: String,
        limit: usize,
        depth: usize,
    },

    #[error("Column `{column}` cannot change type from {existing} to {proposed}")]
    TypeConflict {
        column: String,
        existing: String,
        proposed: String,
    },

    #[error("Cannot rename column `{column}` to `{target}`: a column with that name already exists")]
    RenameCollision { column: String, target: String },

    #[error("Drop dependency: {0}")]
    DropDependency(String),

    #[error("Dropping all columns of table [{table}] is not allowed")]
    DropAllColumns { table: String },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Column `{column}` unknown in {parent}")]
    ColumnUnknown { column: String, parent: String },

    #[error("Invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("Expression evaluation failed for '{expression}': {reason}")]
    ExpressionEvaluation { expression: String, reason: String },

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("Schema version {version} of table {table} not found")]
    VersionNotFound { table: String, version: u64 },
}

impl SchemaError {
    /// Builds `ColumnUnknown` for a key under `parent` (`None` for the table root)
    pub fn column_unknown(column: impl ToString, parent: Option<&crate::ColumnPath>) -> Self {
        SchemaError::ColumnUnknown {
            column: column.to_string(),
            parent: match parent {
                Some(path) => format!("object `{}`", path),
                None => "table".to_string(),
            },
        }
    }

    pub fn is_schema_violation(&self) -> bool {
        !matches!(
            self,
            SchemaError::TableNotFound(_) | SchemaError::VersionNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ColumnPath;

    #[test]
    fn test_column_unknown_message_names_parent() {
        let parent = ColumnPath::root("o");
        let err = SchemaError::column_unknown("o.y", Some(&parent));
        assert_eq!(err.to_string(), "Column `o.y` unknown in object `o`");
        let err = SchemaError::column_unknown("x", None);
        assert_eq!(err.to_string(), "Column `x` unknown in table");
    }

    #[test]
    fn test_schema_violation_classification() {
        assert!(SchemaError::InvalidSchema("x".into()).is_schema_violation());
        assert!(!SchemaError::TableNotFound("t".into()).is_schema_violation());
    }
}
