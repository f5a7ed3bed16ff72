use std::collections::BTreeMap;
use std::sync::Arc;

use crate::column_definition::{ColumnDescriptor, ColumnKind};
use crate::column_path::ColumnPath;
use crate::error::{Result, SchemaError};
use crate::mutator::next_version;
use crate::system_columns::SystemColumns;
use crate::table_schema::{refresh_object_types, TableSchema};

/// Rename the leaf of `target` to `new_name`.
///
/// Descendants move along with the column; every structure embedding a path
/// (expressions, index sources, key lists) is rewritten to the new path.
/// Column ids are untouched, so stored documents stay valid.
pub fn rename_column(
    schema: &Arc<TableSchema>,
    target: &ColumnPath,
    new_name: &str,
) -> Result<Arc<TableSchema>> {
    if target.is_root() && SystemColumns::is_system_column(target.root_name()) {
        return Err(SchemaError::InvalidSchema(format!(
            "System column `{}` cannot be renamed",
            target
        )));
    }
    if schema.column(target).is_none() {
        return Err(SchemaError::column_unknown(target, target.parent().as_ref()));
    }
    SystemColumns::validate_name(new_name, target.is_root())?;

    let new_path = target.with_name(new_name);
    if &new_path == target {
        return Ok(Arc::clone(schema));
    }
    if schema.column(&new_path).is_some()
        || (new_path.is_root() && schema.index_column(new_name).is_some())
    {
        return Err(SchemaError::RenameCollision {
            column: target.to_string(),
            target: new_path.to_string(),
        });
    }

    let rename = |path: &ColumnPath| path.replace_prefix(target, &new_path);

    // Phase 1: old path -> renamed descriptor for the whole subtree
    let renamed: BTreeMap<ColumnPath, ColumnDescriptor> = schema
        .subtree(target)
        .filter_map(|column| {
            let path = rename(&column.path)?;
            let mut descriptor = column.clone();
            descriptor.path = path;
            Some((column.path.clone(), descriptor))
        })
        .collect();

    // Phase 2: swap the subtree and rewrite every path-embedding structure
    let mut next = next_version(schema);
    for (old_path, descriptor) in renamed {
        next.columns.remove(&old_path);
        next.columns.insert(descriptor.path.clone(), descriptor);
    }

    for column in next.columns.values_mut() {
        column.kind = match &column.kind {
            ColumnKind::Plain => ColumnKind::Plain,
            ColumnKind::Default { expression } => ColumnKind::Default {
                expression: expression.rename_columns(rename),
            },
            ColumnKind::Generated { expression } => ColumnKind::Generated {
                expression: expression.rename_columns(rename),
            },
        };
    }
    for check in next.check_constraints.iter_mut() {
        check.expression = check.expression.rename_columns(rename);
    }
    for index in next.index_columns.iter_mut() {
        for source in index.sources.iter_mut() {
            if let Some(path) = rename(source) {
                *source = path;
            }
        }
    }
    for path in next
        .primary_key
        .iter_mut()
        .chain(next.partitioned_by.iter_mut())
        .chain(next.clustered_by.iter_mut())
    {
        if let Some(renamed) = rename(path) {
            *path = renamed;
        }
    }

    if let Some(parent) = new_path.parent() {
        refresh_object_types(&mut next.columns, [parent]);
    }

    log::debug!(
        "Renamed column `{}` to `{}` in {} (version {})",
        target,
        new_path,
        schema.table_id,
        next.version
    );
    Ok(Arc::new(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Analyzer, DataType, IndexColumn, ObjectType, SchemaIdAllocator, SchemaLimits, TableId};

    fn schema() -> Arc<TableSchema> {
        Arc::new(
            TableSchema::builder(TableId::new("app", "docs"))
                .column(ColumnDescriptor::new(ColumnPath::root("id"), DataType::BigInt))
                .column(ColumnDescriptor::new(
                    ColumnPath::root("o"),
                    DataType::Object(ObjectType::new()),
                ))
                .column(ColumnDescriptor::new(ColumnPath::new("o", ["a"]), DataType::Int))
                .column(ColumnDescriptor::new(ColumnPath::new("o", ["b"]), DataType::Text))
                .column(
                    ColumnDescriptor::new(ColumnPath::root("a_plus"), DataType::BigInt)
                        .generated("o.a + 1")
                        .unwrap(),
                )
                .primary_key(ColumnPath::root("id"))
                .check("a_positive", "o.a > 0")
                .index_column(IndexColumn::new(
                    "ft",
                    vec![ColumnPath::new("o", ["b"])],
                    Analyzer::Standard,
                ))
                .build(&mut SchemaIdAllocator::new(), &SchemaLimits::default())
                .unwrap(),
        )
    }

    #[test]
    fn test_rename_object_moves_subtree_and_dependents() {
        let schema = schema();
        let a_id = schema.column(&ColumnPath::new("o", ["a"])).unwrap().column_id;
        let next = rename_column(&schema, &ColumnPath::root("o"), "obj").unwrap();

        assert!(next.column(&ColumnPath::root("o")).is_none());
        let a = next.column(&ColumnPath::new("obj", ["a"])).unwrap();
        assert_eq!(a.column_id, a_id);
        assert_eq!(
            next.column(&ColumnPath::root("a_plus"))
                .unwrap()
                .generated_expression()
                .unwrap()
                .source(),
            "obj.a + 1"
        );
        assert_eq!(next.check_constraints()[0].expression.source(), "obj.a > 0");
        assert_eq!(next.index_columns()[0].sources[0], ColumnPath::new("obj", ["b"]));
        assert_eq!(next.version(), schema.version() + 1);
    }

    #[test]
    fn test_rename_nested_leaf_updates_parent_record() {
        let schema = schema();
        let next = rename_column(&schema, &ColumnPath::new("o", ["b"]), "body").unwrap();
        let record = next
            .column(&ColumnPath::root("o"))
            .unwrap()
            .data_type
            .object_type()
            .unwrap()
            .clone();
        let names: Vec<&str> = record.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "body"]);
    }

    #[test]
    fn test_rename_collisions() {
        let schema = schema();
        assert!(matches!(
            rename_column(&schema, &ColumnPath::new("o", ["a"]), "b"),
            Err(SchemaError::RenameCollision { .. })
        ));
        assert!(matches!(
            rename_column(&schema, &ColumnPath::root("id"), "ft"),
            Err(SchemaError::RenameCollision { .. })
        ));
        assert!(matches!(
            rename_column(&schema, &ColumnPath::root("missing"), "x"),
            Err(SchemaError::ColumnUnknown { .. })
        ));
    }

    #[test]
    fn test_rename_primary_key_column() {
        let schema = schema();
        let next = rename_column(&schema, &ColumnPath::root("id"), "key").unwrap();
        assert_eq!(next.primary_key(), &[ColumnPath::root("key")]);
    }

    #[test]
    fn test_renamed_references_survive_persistence() {
        let schema = schema();
        let next = rename_column(&schema, &ColumnPath::new("o", ["a"]), "unit-count").unwrap();
        let next = rename_column(&next, &ColumnPath::root("o"), "select").unwrap();
        let expected = ColumnPath::new("select", ["unit-count"]);
        assert_eq!(next.check_constraints()[0].expression.source(), r#""select"."unit-count" > 0"#);

        let bytes = bincode::serde::encode_to_vec(next.as_ref(), bincode::config::standard()).unwrap();
        let (decoded, _): (TableSchema, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(decoded.check_constraints()[0].expression.columns(), &[expected.clone()]);
        let generated = decoded.column(&ColumnPath::root("a_plus")).unwrap().generated_expression().unwrap();
        assert_eq!(generated.columns(), &[expected]);
    }
}
