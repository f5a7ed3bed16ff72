//! Reserved system column names
//!
//! System columns are resolved by the engine, never stored as user columns.
//! Every top-level name starting with `_` is reserved.

use crate::error::{Result, SchemaError};

pub struct SystemColumns;

impl SystemColumns {
    pub const ID: &'static str = "_id";
    pub const VERSION: &'static str = "_version";
    pub const SEQ_NO: &'static str = "_seq_no";
    pub const SCORE: &'static str = "_score";
    pub const RAW: &'static str = "_raw";
    pub const DOCID: &'static str = "_docid";

    pub const ALL: [&'static str; 6] = [
        Self::ID,
        Self::VERSION,
        Self::SEQ_NO,
        Self::SCORE,
        Self::RAW,
        Self::DOCID,
    ];

    /// Storage-key prefix for values of columns that are not committed yet
    pub const UNRESOLVED_PREFIX: &'static str = "_u_";

    /// Search-field prefix for array length fields
    pub const ARRAY_LENGTH_PREFIX: &'static str = "_array_length_";

    pub fn is_system_column(name: &str) -> bool {
        Self::ALL.contains(&name)
    }

    pub fn is_reserved(name: &str) -> bool {
        name.starts_with('_')
    }

    /// Validate a user supplied column name (any segment of a path)
    pub fn validate_name(name: &str, is_root: bool) -> Result<()> {
        if name.is_empty() {
            return Err(SchemaError::InvalidSchema("Column name must not be empty".to_string()));
        }
        if name.contains('.') || name.contains('[') || name.contains(']') || name.contains('\'') {
            return Err(SchemaError::InvalidSchema(format!(
                "Column name '{}' contains illegal characters",
                name
            )));
        }
        if is_root && Self::is_reserved(name) {
            return Err(SchemaError::InvalidSchema(format!(
                "Column name '{}' is reserved: names starting with '_' belong to system columns",
                name
            )));
        }
        Ok(())
    }
}
