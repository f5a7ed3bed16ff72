use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::column_definition::ColumnDescriptor;
use crate::column_path::ColumnPath;
use crate::column_policy::ColumnPolicy;
use crate::constraints::CheckConstraintDef;
use crate::error::{Result, SchemaError};
use crate::id_allocator::ColumnIdAllocator;
use crate::mutator::next_version;
use crate::system_columns::SystemColumns;
use crate::table_schema::{
    bind_check, check_limits, expand_object_fields, refresh_object_types,
    validate_column_expressions, SchemaLimits, TableSchema,
};
use crate::type_resolver::{TypeResolver, Widening};

/// Merge newly observed or declared columns into `schema`.
///
/// `pk_indices` point into `new_columns` and name columns that join the
/// primary key. Proposals for columns that already exist are reconciled with
/// the widening rules, so the same proposal submitted twice (for example by
/// two shards discovering the same key) collapses into a no-op.
pub fn add_columns(
    schema: &Arc<TableSchema>,
    new_columns: Vec<ColumnDescriptor>,
    pk_indices: &[usize],
    new_checks: Vec<CheckConstraintDef>,
    allocator: &mut dyn ColumnIdAllocator,
    limits: &SchemaLimits,
) -> Result<Arc<TableSchema>> {
    let mut pk_paths = Vec::with_capacity(pk_indices.len());
    for idx in pk_indices {
        let column = new_columns.get(*idx).ok_or_else(|| {
            SchemaError::InvalidSchema(format!(
                "Primary key index {} is out of range for {} new columns",
                idx,
                new_columns.len()
            ))
        })?;
        pk_paths.push(column.path.clone());
    }

    let proposed = expand_object_fields(new_columns);
    let batch_paths: BTreeSet<&ColumnPath> = proposed.iter().map(|c| &c.path).collect();

    for column in &proposed {
        for (idx, segment) in column.path.segments().iter().enumerate() {
            SystemColumns::validate_name(segment, idx == 0)?;
        }

        // A nested column dropped under a STRICT object stays unknown
        if let Some(parent) = column.path.parent() {
            if schema.is_dropped(&column.path)
                && schema.policy_under(Some(&parent)) == ColumnPolicy::Strict
            {
                return Err(SchemaError::column_unknown(&column.path, Some(&parent)));
            }
        }

        for ancestor in column.path.ancestors() {
            // A proposal may widen an undefined array into an object array
            let ancestor_type = proposed
                .iter()
                .find(|c| c.path == ancestor)
                .map(|c| &c.data_type)
                .or_else(|| schema.column(&ancestor).map(|c| &c.data_type));
            match ancestor_type {
                Some(t) if t.holds_objects() => {}
                Some(t) => {
                    return Err(SchemaError::InvalidSchema(format!(
                        "Cannot add column `{}`: ancestor `{}` is of type {}, not an object",
                        column.path, ancestor, t
                    )))
                }
                None if batch_paths.contains(&ancestor) => {}
                None => {
                    return Err(SchemaError::InvalidSchema(format!(
                        "Cannot add column `{}` because its parent `{}` does not exist",
                        column.path, ancestor
                    )))
                }
            }
        }
    }

    // Parents are processed before their children
    let mut ordered = proposed;
    ordered.sort_by_key(|c| c.path.depth());

    let next_version_number = schema.version + 1;
    let mut columns: BTreeMap<ColumnPath, ColumnDescriptor> = schema.columns.clone();
    let mut touched: BTreeSet<ColumnPath> = BTreeSet::new();
    let mut changed = false;

    for proposal in ordered {
        match columns.get_mut(&proposal.path) {
            Some(existing) => {
                match TypeResolver::widen(&proposal.path, &existing.data_type, &proposal.data_type)? {
                    Widening::Unchanged => {
                        log::trace!("Column `{}` already present, skipping", proposal.path);
                    }
                    Widening::Widened(data_type) => {
                        log::debug!(
                            "Widening column `{}` from {} to {}",
                            proposal.path,
                            existing.data_type,
                            data_type
                        );
                        existing.data_type = data_type;
                        if existing.data_type.holds_objects() && existing.column_policy.is_none() {
                            existing.column_policy = Some(ColumnPolicy::Dynamic);
                        }
                        touched.insert(proposal.path.clone());
                        changed = true;
                    }
                }
            }
            None => {
                let mut column = proposal;
                if !column.column_id.is_assigned() || id_in_use(schema, &columns, &column) {
                    column.column_id = allocator.next_column_id();
                }
                if column.position <= 0 {
                    column.position = allocator.next_position();
                }
                column.since_version = next_version_number;
                column.dropped = false;
                if column.data_type.holds_objects() && column.column_policy.is_none() {
                    column.column_policy = Some(ColumnPolicy::Dynamic);
                }
                log::debug!(
                    "Adding column `{}` ({}) with id {} to {}",
                    column.path,
                    column.data_type,
                    column.column_id,
                    schema.table_id
                );
                touched.insert(column.path.clone());
                columns.insert(column.path.clone(), column);
                changed = true;
            }
        }
    }

    let mut next = next_version(schema);

    for path in pk_paths {
        if next.primary_key.contains(&path) {
            continue;
        }
        let column = columns.get_mut(&path).ok_or_else(|| {
            SchemaError::InvalidSchema(format!("Primary key column `{}` does not exist", path))
        })?;
        if column.data_type.is_array() || column.data_type.is_object() {
            return Err(SchemaError::InvalidSchema(format!(
                "Column `{}` of type {} cannot be part of the primary key",
                path, column.data_type
            )));
        }
        column.is_nullable = false;
        if next.auto_generated_pk {
            next.primary_key.clear();
            next.auto_generated_pk = false;
        }
        next.primary_key.push(path);
        changed = true;
    }

    if !changed && new_checks.is_empty() {
        return Ok(Arc::clone(schema));
    }

    refresh_object_types(&mut columns, touched);
    check_limits(&schema.table_id, &columns, limits)?;
    validate_column_expressions(&columns)?;

    for def in &new_checks {
        let check = bind_check(&columns, &next.check_constraints, def)?;
        next.check_constraints.push(check);
    }

    next.columns = columns;
    log::debug!(
        "Schema of {} advanced to version {} ({} columns)",
        next.table_id,
        next.version,
        next.columns.len()
    );
    Ok(Arc::new(next))
}

/// True if a proposal carries an id that already belongs to another column
/// (live or dropped); such ids are replaced by freshly allocated ones.
fn id_in_use(
    schema: &TableSchema,
    columns: &BTreeMap<ColumnPath, ColumnDescriptor>,
    column: &ColumnDescriptor,
) -> bool {
    columns.values().any(|c| c.column_id == column.column_id)
        || schema.dropped_columns.iter().any(|c| c.column_id == column.column_id)
        || schema.index_columns.iter().any(|c| c.column_id == column.column_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::{DataType, ObjectType};
    use crate::id_allocator::SchemaIdAllocator;
    use crate::ids::TableId;

    fn base_schema() -> Arc<TableSchema> {
        Arc::new(
            TableSchema::builder(TableId::new("app", "docs"))
                .column(ColumnDescriptor::new(ColumnPath::root("id"), DataType::BigInt))
                .column(ColumnDescriptor::new(
                    ColumnPath::root("o"),
                    DataType::Object(ObjectType::new()),
                ))
                .primary_key(ColumnPath::root("id"))
                .column_policy(ColumnPolicy::Dynamic)
                .build(&mut SchemaIdAllocator::new(), &SchemaLimits::default())
                .unwrap(),
        )
    }

    fn add(schema: &Arc<TableSchema>, columns: Vec<ColumnDescriptor>) -> Result<Arc<TableSchema>> {
        let mut allocator = SchemaIdAllocator::for_schema(schema);
        add_columns(schema, columns, &[], vec![], &mut allocator, &SchemaLimits::default())
    }

    #[test]
    fn test_add_nested_updates_parent_record() {
        let schema = base_schema();
        let next = add(
            &schema,
            vec![ColumnDescriptor::new(ColumnPath::new("o", ["x"]), DataType::Text)],
        )
        .unwrap();
        assert_eq!(next.version(), schema.version() + 1);
        let o = next.column(&ColumnPath::root("o")).unwrap();
        assert_eq!(o.data_type.object_type().unwrap().field("x"), Some(&DataType::Text));
        let x = next.column(&ColumnPath::new("o", ["x"])).unwrap();
        assert_eq!(x.since_version, next.version());
        assert!(x.column_id.is_assigned());
    }

    #[test]
    fn test_duplicate_proposal_is_noop() {
        let schema = base_schema();
        let proposal = vec![ColumnDescriptor::new(ColumnPath::root("name"), DataType::Text)];
        let next = add(&schema, proposal.clone()).unwrap();
        let again = add(&next, proposal).unwrap();
        assert!(Arc::ptr_eq(&next, &again));
    }

    #[test]
    fn test_missing_ancestor_fails() {
        let schema = base_schema();
        let result = add(
            &schema,
            vec![ColumnDescriptor::new(ColumnPath::new("p", ["x"]), DataType::Text)],
        );
        assert!(matches!(result, Err(SchemaError::InvalidSchema(_))));
    }

    #[test]
    fn test_type_conflict() {
        let schema = base_schema();
        let result = add(&schema, vec![ColumnDescriptor::new(ColumnPath::root("id"), DataType::Text)]);
        assert!(matches!(result, Err(SchemaError::TypeConflict { .. })));
    }

    #[test]
    fn test_depth_limit() {
        let schema = base_schema();
        let mut allocator = SchemaIdAllocator::for_schema(&schema);
        let limits = SchemaLimits {
            max_columns: 1000,
            max_depth: 2,
        };
        let object = DataType::Object(ObjectType::new());
        let result = add_columns(
            &schema,
            vec![
                ColumnDescriptor::new(ColumnPath::new("o", ["a"]), object),
                ColumnDescriptor::new(ColumnPath::new("o", ["a", "b"]), DataType::Int),
            ],
            &[],
            vec![],
            &mut allocator,
            &limits,
        );
        assert!(matches!(result, Err(SchemaError::DepthLimitExceeded { depth: 3, .. })));
    }

    #[test]
    fn test_pk_replaces_auto_generated_key() {
        let schema = Arc::new(
            TableSchema::builder(TableId::new("app", "t"))
                .column(ColumnDescriptor::new(ColumnPath::root("a"), DataType::Int))
                .build(&mut SchemaIdAllocator::new(), &SchemaLimits::default())
                .unwrap(),
        );
        assert!(schema.auto_generated_pk());
        let mut allocator = SchemaIdAllocator::for_schema(&schema);
        let next = add_columns(
            &schema,
            vec![ColumnDescriptor::new(ColumnPath::root("key"), DataType::Text)],
            &[0],
            vec![],
            &mut allocator,
            &SchemaLimits::default(),
        )
        .unwrap();
        assert!(!next.auto_generated_pk());
        assert_eq!(next.primary_key(), &[ColumnPath::root("key")]);
        assert!(!next.column(&ColumnPath::root("key")).unwrap().is_nullable);
    }

    #[test]
    fn test_new_check_is_bound_against_merged_columns() {
        let schema = base_schema();
        let mut allocator = SchemaIdAllocator::for_schema(&schema);
        let next = add_columns(
            &schema,
            vec![ColumnDescriptor::new(ColumnPath::root("qty"), DataType::Int)],
            &[],
            vec![CheckConstraintDef::new("qty_positive", "qty > 0")],
            &mut allocator,
            &SchemaLimits::default(),
        )
        .unwrap();
        assert_eq!(next.check_constraints().len(), 1);

        let mut allocator = SchemaIdAllocator::for_schema(&next);
        let unknown = add_columns(
            &next,
            vec![],
            &[],
            vec![CheckConstraintDef::new("bad", "missing > 0")],
            &mut allocator,
            &SchemaLimits::default(),
        );
        assert!(matches!(unknown, Err(SchemaError::ColumnUnknown { .. })));
    }
}
