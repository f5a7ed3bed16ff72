//! Schema mutations
//!
//! Pure functions from the current schema to the next one. Each returns either
//! a new schema with `version + 1` or, when nothing would change, the very same
//! `Arc` it was given (check with `Arc::ptr_eq`). They never touch shared
//! state; the metadata coordinator serialises them per table.

mod add_columns;
mod drop_columns;
mod drop_constraint;
mod rename_column;

pub use add_columns::add_columns;
pub use drop_columns::{drop_columns, DropColumn};
pub use drop_constraint::drop_constraint;
pub use rename_column::rename_column;

use crate::table_schema::TableSchema;

/// Copy of `schema` ready to be modified into the next version
pub(crate) fn next_version(schema: &TableSchema) -> TableSchema {
    let mut next = schema.clone();
    next.version = schema.version + 1;
    next
}
