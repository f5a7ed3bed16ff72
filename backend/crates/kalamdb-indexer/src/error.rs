//! Error types for row indexing

use kalamdb_schema::SchemaError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

/// Why a single row was refused. Other rows and the schema are unaffected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowRejection {
    #[error("\"{column}\" must not be null")]
    NotNull { column: String },

    #[error("Failed CONSTRAINT {name} CHECK ({expression}) for values: [{values}]")]
    CheckConstraint {
        name: String,
        expression: String,
        values: String,
    },

    #[error("Given value {supplied} for generated column {column} does not match calculation {computed}")]
    GeneratedMismatch {
        column: String,
        supplied: String,
        computed: String,
    },

    #[error("Value {value} is out of range for column `{column}` of type {data_type}")]
    Overflow {
        column: String,
        value: String,
        data_type: String,
    },

    #[error("Cannot cast value {value} of column `{column}` to type {data_type}: {reason}")]
    InvalidValue {
        column: String,
        value: String,
        data_type: String,
        reason: String,
    },

    #[error("Evaluation of `{column}` failed: {reason}")]
    Evaluation { column: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexerError {
    #[error("Row rejected: {0}")]
    RowRejected(RowRejection),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Programming error in the caller, never caused by row content
    #[error("Indexer misuse: {0}")]
    IndexerMisuse(String),

    #[error("Storage encoding error: {0}")]
    Encoding(String),
}

impl IndexerError {
    pub fn is_column_unknown(&self) -> bool {
        matches!(self, IndexerError::Schema(SchemaError::ColumnUnknown { .. }))
    }

    pub fn is_row_rejection(&self) -> bool {
        matches!(self, IndexerError::RowRejected(_))
    }
}

impl From<RowRejection> for IndexerError {
    fn from(rejection: RowRejection) -> Self {
        IndexerError::RowRejected(rejection)
    }
}

impl From<bincode::error::EncodeError> for IndexerError {
    fn from(e: bincode::error::EncodeError) -> Self {
        IndexerError::Encoding(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for IndexerError {
    fn from(e: bincode::error::DecodeError) -> Self {
        IndexerError::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages() {
        let err: IndexerError = RowRejection::NotNull {
            column: "o.x".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Row rejected: \"o.x\" must not be null");
        assert!(err.is_row_rejection());
    }

    #[test]
    fn test_column_unknown_passthrough() {
        let err: IndexerError = SchemaError::column_unknown("y", None).into();
        assert!(err.is_column_unknown());
        assert_eq!(err.to_string(), "Column `y` unknown in table");
    }
}
