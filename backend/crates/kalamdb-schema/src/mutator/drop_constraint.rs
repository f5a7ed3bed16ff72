use std::sync::Arc;

use crate::mutator::next_version;
use crate::table_schema::TableSchema;

/// Remove the check constraint called `name`. Unknown names are a no-op.
pub fn drop_constraint(schema: &Arc<TableSchema>, name: &str) -> Arc<TableSchema> {
    if !schema.check_constraints.iter().any(|c| c.name == name) {
        return Arc::clone(schema);
    }

    let mut next = next_version(schema);
    next.check_constraints.retain(|c| c.name != name);
    log::debug!(
        "Dropped check constraint '{}' from {} (version {})",
        name,
        schema.table_id,
        next.version
    );
    Arc::new(next)
}
