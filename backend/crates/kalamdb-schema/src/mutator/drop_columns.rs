use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::column_path::ColumnPath;
use crate::error::{Result, SchemaError};
use crate::mutator::next_version;
use crate::system_columns::SystemColumns;
use crate::table_schema::{refresh_object_types, TableSchema};

/// One `DROP COLUMN` target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropColumn {
    pub path: ColumnPath,
    /// Skip silently when the column does not exist
    pub if_exists: bool,
}

impl DropColumn {
    pub fn new(path: ColumnPath) -> Self {
        Self {
            path,
            if_exists: false,
        }
    }

    pub fn if_exists(path: ColumnPath) -> Self {
        Self {
            path,
            if_exists: true,
        }
    }
}

/// Tombstone the target columns and their descendants.
///
/// All dependency checks run before anything is modified, so a rejected batch
/// leaves no trace.
pub fn drop_columns(schema: &Arc<TableSchema>, targets: &[DropColumn]) -> Result<Arc<TableSchema>> {
    let mut accepted: Vec<&ColumnPath> = Vec::new();
    for target in targets {
        if target.path.is_root() && SystemColumns::is_system_column(target.path.root_name()) {
            return Err(SchemaError::DropDependency(format!(
                "System column `{}` cannot be dropped",
                target.path
            )));
        }
        if schema.column(&target.path).is_none() {
            if target.if_exists {
                continue;
            }
            return Err(SchemaError::column_unknown(&target.path, target.path.parent().as_ref()));
        }
        if !accepted.contains(&&target.path) {
            accepted.push(&target.path);
        }
    }
    if accepted.is_empty() {
        return Ok(Arc::clone(schema));
    }

    let dropped: BTreeSet<ColumnPath> = accepted
        .iter()
        .flat_map(|target| schema.subtree(*target).map(|c| c.path.clone()))
        .collect();

    for target in &accepted {
        validate_drop(schema, target, &dropped)?;
    }

    let remaining_roots = schema
        .columns
        .keys()
        .filter(|p| p.is_root() && !dropped.contains(*p))
        .count();
    if remaining_roots == 0 {
        return Err(SchemaError::DropAllColumns {
            table: schema.table_id.to_string(),
        });
    }

    let mut next = next_version(schema);
    for path in &dropped {
        if let Some(mut column) = next.columns.remove(path) {
            column.dropped = true;
            next.dropped_columns.push(column);
        }
    }

    next.check_constraints
        .retain(|check| !check.columns().iter().any(|c| dropped.contains(c)));

    // Parents that survive lose the dropped children from their records
    let surviving_parents: Vec<ColumnPath> = accepted
        .iter()
        .filter_map(|target| target.parent())
        .filter(|parent| !dropped.contains(parent))
        .collect();
    refresh_object_types(&mut next.columns, surviving_parents);

    log::debug!(
        "Dropped {} column(s) from {} (version {})",
        dropped.len(),
        schema.table_id,
        next.version
    );
    Ok(Arc::new(next))
}

fn validate_drop(schema: &TableSchema, target: &ColumnPath, dropped: &BTreeSet<ColumnPath>) -> Result<()> {
    let in_subtree = |path: &ColumnPath| path.is_within(target);

    if let Some(pk) = schema.primary_key.iter().find(|p| in_subtree(*p)) {
        return Err(SchemaError::DropDependency(format!(
            "Dropping column `{}` which is part of the PRIMARY KEY (`{}`) is not allowed",
            target, pk
        )));
    }
    if schema.partitioned_by.iter().any(|p| in_subtree(p)) {
        return Err(SchemaError::DropDependency(format!(
            "Dropping column `{}` which is part of the PARTITIONED BY columns is not allowed",
            target
        )));
    }
    if schema.clustered_by.as_ref().map(|p| in_subtree(p)).unwrap_or(false) {
        return Err(SchemaError::DropDependency(format!(
            "Dropping column `{}` which is used in CLUSTERED BY is not allowed",
            target
        )));
    }
    if let Some(index) = schema.index_columns.iter().find(|i| i.uses(target)) {
        return Err(SchemaError::DropDependency(format!(
            "Dropping column `{}` which is used to produce values for index column '{}' is not allowed",
            target, index.name
        )));
    }
    for column in schema.columns.values() {
        if dropped.contains(&column.path) {
            continue;
        }
        if let Some(expression) = column.generated_expression() {
            if expression.references_within(target) {
                return Err(SchemaError::DropDependency(format!(
                    "Dropping column `{}` which is used to produce values for generated column `{}` is not allowed",
                    target, column.path
                )));
            }
        }
    }
    for check in &schema.check_constraints {
        let columns = check.columns();
        let uses_target = columns.iter().any(|c| in_subtree(c));
        let uses_others = columns.iter().any(|c| !in_subtree(c));
        if uses_target && uses_others {
            return Err(SchemaError::DropDependency(format!(
                "Dropping column `{}` which is used in CHECK CONSTRAINT '{}' together with other columns is not allowed",
                target, check.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Analyzer, ColumnDescriptor, DataType, IndexColumn, ObjectType, SchemaIdAllocator,
        SchemaLimits, TableId,
    };

    fn schema() -> Arc<TableSchema> {
        Arc::new(
            TableSchema::builder(TableId::new("app", "docs"))
                .column(ColumnDescriptor::new(ColumnPath::root("id"), DataType::BigInt))
                .column(ColumnDescriptor::new(
                    ColumnPath::root("o"),
                    DataType::Object(ObjectType::new()),
                ))
                .column(ColumnDescriptor::new(ColumnPath::new("o", ["a"]), DataType::Int))
                .column(ColumnDescriptor::new(ColumnPath::new("o", ["b"]), DataType::Int))
                .column(ColumnDescriptor::new(ColumnPath::root("body"), DataType::Text))
                .column(
                    ColumnDescriptor::new(ColumnPath::root("total"), DataType::BigInt)
                        .generated("o.a + 1")
                        .unwrap(),
                )
                .column(ColumnDescriptor::new(ColumnPath::root("qty"), DataType::Int))
                .column(ColumnDescriptor::new(ColumnPath::root("min_qty"), DataType::Int))
                .primary_key(ColumnPath::root("id"))
                .check("qty_positive", "qty > 0")
                .check("qty_above_min", "qty >= min_qty")
                .index_column(IndexColumn::new(
                    "body_ft",
                    vec![ColumnPath::root("body")],
                    Analyzer::Standard,
                ))
                .build(&mut SchemaIdAllocator::new(), &SchemaLimits::default())
                .unwrap(),
        )
    }

    fn drop_one(schema: &Arc<TableSchema>, path: ColumnPath) -> Result<Arc<TableSchema>> {
        drop_columns(schema, &[DropColumn::new(path)])
    }

    #[test]
    fn test_drop_nested_updates_parent_and_tombstones() {
        let schema = schema();
        let next = drop_one(&schema, ColumnPath::new("o", ["b"])).unwrap();
        assert_eq!(next.version(), schema.version() + 1);
        assert!(next.column(&ColumnPath::new("o", ["b"])).is_none());
        assert!(next.is_dropped(&ColumnPath::new("o", ["b"])));
        let record = next.column(&ColumnPath::root("o")).unwrap().data_type.object_type().unwrap().clone();
        assert!(record.field("b").is_none());
        assert!(record.field("a").is_some());
        assert!(next.dropped_columns().iter().all(|c| c.dropped));
    }

    #[test]
    fn test_drop_dependencies() {
        let schema = schema();
        for path in [
            ColumnPath::root("id"),
            ColumnPath::root("body"),
            ColumnPath::new("o", ["a"]),
            ColumnPath::root("o"),
            ColumnPath::root("min_qty"),
        ] {
            let result = drop_one(&schema, path.clone());
            assert!(
                matches!(result, Err(SchemaError::DropDependency(_))),
                "dropping {} should fail",
                path
            );
        }
        let system = drop_one(&schema, ColumnPath::root("_id"));
        assert!(matches!(system, Err(SchemaError::DropDependency(_))));
    }

    #[test]
    fn test_drop_removes_single_column_constraints() {
        let schema = Arc::new(
            TableSchema::builder(TableId::new("app", "t"))
                .column(ColumnDescriptor::new(ColumnPath::root("a"), DataType::Int))
                .column(ColumnDescriptor::new(ColumnPath::root("qty"), DataType::Int))
                .check("qty_positive", "qty > 0")
                .build(&mut SchemaIdAllocator::new(), &SchemaLimits::default())
                .unwrap(),
        );
        let next = drop_one(&schema, ColumnPath::root("qty")).unwrap();
        assert!(next.check_constraints().is_empty());
    }

    #[test]
    fn test_drop_all_and_unknown() {
        let schema = Arc::new(
            TableSchema::builder(TableId::new("app", "t"))
                .column(ColumnDescriptor::new(ColumnPath::root("a"), DataType::Int))
                .build(&mut SchemaIdAllocator::new(), &SchemaLimits::default())
                .unwrap(),
        );
        assert!(matches!(
            drop_one(&schema, ColumnPath::root("a")),
            Err(SchemaError::DropAllColumns { .. })
        ));
        assert!(matches!(
            drop_one(&schema, ColumnPath::root("missing")),
            Err(SchemaError::ColumnUnknown { .. })
        ));
        let unchanged = drop_columns(&schema, &[DropColumn::if_exists(ColumnPath::root("missing"))]).unwrap();
        assert!(Arc::ptr_eq(&schema, &unchanged));
    }
}
