//! RowIndexer - per-statement row pipeline
//!
//! A writer binds one indexer to a table schema and a list of target
//! columns, then feeds it rows:
//!
//! 1. `discover_columns` reports keys the schema does not know yet
//! 2. the caller commits them through the metadata coordinator and calls
//!    `rebind` with the returned schema
//! 3. `index` evaluates generated columns, applies defaults, enforces
//!    NOT NULL and CHECK constraints, and produces the storage document and
//!    search fields

use std::sync::Arc;

use serde_json::Value;

use kalamdb_schema::{
    values_equal, ColumnDescriptor, ColumnPath, ColumnPolicy, SchemaError, SystemColumns, TableSchema,
};

use crate::discovery::ColumnDiscovery;
use crate::encoder::{coerce_scalar, DocumentEncoder};
use crate::error::{IndexerError, Result, RowRejection};
use crate::row::{build_row_tree, get_path, parent_present, set_path, RowTree};
use crate::search_field::SearchField;
use crate::settings::{AccessMode, IndexerOptions};
use crate::storage_form::{StorageDocument, StoredValue, UntypedKeys};
use crate::storage_support::{SearchFieldEmitter, StorageSupport};

/// Result of indexing one row
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedDocument {
    /// Version of the schema the document was encoded with
    pub schema_version: u64,
    /// Primary key values in key order; empty for the auto-generated `_id`
    pub primary_key: Vec<Value>,
    /// Partition column values, kept out of the stored document
    pub partition_values: Vec<(ColumnPath, Value)>,
    pub storage: StorageDocument,
    /// Binary form of `storage`, as written to the write-ahead log
    pub source: Vec<u8>,
    pub fields: Vec<SearchField>,
    /// Paths stored under `_u_` keys because they are not committed yet
    pub pending_columns: Vec<ColumnPath>,
}

impl EncodedDocument {
    /// True when every stored value belongs to a committed column
    pub fn is_durable(&self) -> bool {
        self.pending_columns.is_empty()
    }
}

#[derive(Debug)]
pub struct RowIndexer {
    schema: Arc<TableSchema>,
    targets: Vec<ColumnPath>,
    generated_order: Vec<ColumnPath>,
    emitter: SearchFieldEmitter,
    options: IndexerOptions,
}

impl RowIndexer {
    pub fn new(schema: Arc<TableSchema>, targets: Vec<ColumnPath>, options: IndexerOptions) -> Result<Self> {
        validate_targets(&schema, &targets, &options)?;
        let (generated_order, emitter) = Self::bind(&schema, &options)?;
        log::debug!(
            "RowIndexer bound to {} version {} ({} targets)",
            schema.table_id(),
            schema.version(),
            targets.len()
        );
        Ok(Self {
            schema,
            targets,
            generated_order,
            emitter,
            options,
        })
    }

    fn bind(schema: &TableSchema, options: &IndexerOptions) -> Result<(Vec<ColumnPath>, SearchFieldEmitter)> {
        let generated_order = schema
            .generated_evaluation_order()?
            .into_iter()
            .map(|c| c.path.clone())
            .collect();
        let emitter = SearchFieldEmitter::for_schema(schema, &StorageSupport::new(options))?;
        Ok((generated_order, emitter))
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn targets(&self) -> &[ColumnPath] {
        &self.targets
    }

    /// Committed descriptors of the targets (`None` for keys not committed yet)
    pub fn bound_columns(&self) -> Vec<Option<&ColumnDescriptor>> {
        self.targets.iter().map(|t| self.schema.column(t)).collect()
    }

    /// Switch to a newer schema of the same table.
    ///
    /// Targets, options and the statement stay the same; every derived
    /// structure is rebuilt.
    pub fn rebind(&mut self, schema: Arc<TableSchema>) -> Result<()> {
        if schema.table_id() != self.schema.table_id() {
            return Err(IndexerError::IndexerMisuse(format!(
                "Cannot rebind indexer of {} to a schema of {}",
                self.schema.table_id(),
                schema.table_id()
            )));
        }
        if schema.version() < self.schema.version() {
            return Err(IndexerError::IndexerMisuse(format!(
                "Cannot rebind {} from version {} back to version {}",
                schema.table_id(),
                self.schema.version(),
                schema.version()
            )));
        }
        if Arc::ptr_eq(&schema, &self.schema) {
            return Ok(());
        }

        validate_targets(&schema, &self.targets, &self.options)?;
        let (generated_order, emitter) = Self::bind(&schema, &self.options)?;
        log::debug!(
            "RowIndexer for {} rebound from version {} to {}",
            schema.table_id(),
            self.schema.version(),
            schema.version()
        );
        self.schema = schema;
        self.generated_order = generated_order;
        self.emitter = emitter;
        Ok(())
    }

    /// Descriptors for keys of `values` the schema does not know yet.
    ///
    /// Pure with respect to the schema: calling it again with the same row
    /// returns the same descriptors.
    pub fn discover_columns(&self, values: &[Value]) -> Result<Vec<ColumnDescriptor>> {
        let tree = build_row_tree(&self.targets, values)?;
        ColumnDiscovery::new(&self.schema, &self.options).discover(&tree)
    }

    /// Values of generated columns and of defaults the row would receive,
    /// without encoding anything
    pub fn add_generated_values(&self, values: &[Value]) -> Result<Vec<(ColumnPath, Value)>> {
        let mut tree = build_row_tree(&self.targets, values)?;
        let mut added = self.apply_generated(&mut tree)?;
        added.extend(self.apply_defaults(&mut tree)?);
        Ok(added)
    }

    pub fn index(&self, values: &[Value]) -> Result<EncodedDocument> {
        let mut tree = build_row_tree(&self.targets, values)?;

        self.apply_generated(&mut tree)?;
        self.apply_defaults(&mut tree)?;
        self.check_not_null(&tree)?;
        self.check_constraints(&tree)?;

        let encoded = DocumentEncoder::new(&self.schema, &self.options).encode(&tree)?;
        let fields = self.emitter.emit(&encoded.storage)?;
        let source = encoded.storage.to_bytes()?;

        let primary_key = if self.schema.auto_generated_pk() {
            Vec::new()
        } else {
            self.schema
                .primary_key()
                .iter()
                .map(|p| get_path(&tree, p).cloned().unwrap_or(Value::Null))
                .collect()
        };

        if !encoded.pending_columns.is_empty() {
            log::trace!(
                "Row for {} stored {} uncommitted column(s)",
                self.schema.table_id(),
                encoded.pending_columns.len()
            );
        }

        Ok(EncodedDocument {
            schema_version: self.schema.version(),
            primary_key,
            partition_values: encoded.partition_values,
            storage: encoded.storage,
            source,
            fields,
            pending_columns: encoded.pending_columns,
        })
    }

    /// Values of `columns` as expressions see them.
    ///
    /// Absent columns fall back to their default and scalars are coerced to
    /// the column type first, so `"5"` in an INT column reads as `5` and an
    /// RFC 3339 timestamp reads as epoch milliseconds, exactly as stored.
    fn expression_inputs(&self, tree: &RowTree, columns: &[ColumnPath]) -> Result<Vec<(ColumnPath, Value)>> {
        let mut inputs = Vec::with_capacity(columns.len());
        for path in columns {
            inputs.push((path.clone(), self.expression_input(tree, path)?));
        }
        Ok(inputs)
    }

    fn expression_input(&self, tree: &RowTree, path: &ColumnPath) -> Result<Value> {
        let column = self.schema.column(path);
        let value = match get_path(tree, path) {
            Some(value) => value.clone(),
            None => match column.and_then(|c| c.default_expression()) {
                Some(default) if parent_present(tree, path) => default
                    .evaluate(&|_| Value::Null)
                    .map_err(|e| evaluation_failed(path, e))?,
                _ => Value::Null,
            },
        };
        match column {
            Some(column) if !value.is_null() && !column.data_type.is_array() && !column.data_type.is_object() => {
                Ok(coerce_scalar(path, &column.data_type, &value)?.to_json())
            }
            _ => Ok(value),
        }
    }

    fn apply_generated(&self, tree: &mut RowTree) -> Result<Vec<(ColumnPath, Value)>> {
        let mut computed = Vec::with_capacity(self.generated_order.len());
        for path in &self.generated_order {
            let Some(column) = self.schema.column(path) else {
                continue;
            };
            let Some(expression) = column.generated_expression() else {
                continue;
            };
            if !parent_present(tree, path) {
                continue;
            }

            let inputs = self.expression_inputs(tree, expression.columns())?;
            let value = expression
                .evaluate(&|p| input_value(&inputs, p))
                .map_err(|e| evaluation_failed(path, e))?;

            if let Some(supplied) = get_path(tree, path) {
                if !self.same_value(column, supplied, &value)? {
                    return Err(RowRejection::GeneratedMismatch {
                        column: path.to_string(),
                        supplied: supplied.to_string(),
                        computed: value.to_string(),
                    }
                    .into());
                }
            }
            set_path(tree, path, value.clone());
            computed.push((path.clone(), value));
        }
        Ok(computed)
    }

    /// Compare a supplied and a computed value after coercion to the column type
    fn same_value(&self, column: &ColumnDescriptor, supplied: &Value, computed: &Value) -> Result<bool> {
        if supplied.is_null() || computed.is_null() {
            return Ok(supplied.is_null() && computed.is_null());
        }
        if column.data_type.is_array() || column.data_type.is_object() {
            return Ok(values_equal(supplied, computed)
                || StoredValue::untyped(supplied, UntypedKeys::Raw) == StoredValue::untyped(computed, UntypedKeys::Raw));
        }
        let supplied = coerce_scalar(&column.path, &column.data_type, supplied)?;
        let computed = coerce_scalar(&column.path, &column.data_type, computed)?;
        Ok(supplied == computed)
    }

    fn apply_defaults(&self, tree: &mut RowTree) -> Result<Vec<(ColumnPath, Value)>> {
        let mut columns: Vec<&ColumnDescriptor> = self.schema.default_columns().collect();
        columns.sort_by_key(|c| (c.path.depth(), c.position));

        let mut applied = Vec::new();
        for column in columns {
            let Some(default) = column.default_expression() else {
                continue;
            };
            // An explicit NULL is a value, only absent columns get the default
            if get_path(tree, &column.path).is_some() || !parent_present(tree, &column.path) {
                continue;
            }
            let value = default
                .evaluate(&|_| Value::Null)
                .map_err(|e| evaluation_failed(&column.path, e))?;
            set_path(tree, &column.path, value.clone());
            applied.push((column.path.clone(), value));
        }
        Ok(applied)
    }

    fn check_not_null(&self, tree: &RowTree) -> Result<()> {
        for column in self.schema.not_null_columns() {
            if self.schema.is_under_array(&column.path) || !parent_present(tree, &column.path) {
                continue;
            }
            if get_path(tree, &column.path).map_or(true, Value::is_null) {
                return Err(RowRejection::NotNull {
                    column: column.path.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn check_constraints(&self, tree: &RowTree) -> Result<()> {
        for check in self.schema.check_constraints() {
            let inputs = self.expression_inputs(tree, check.columns())?;
            if inputs.iter().all(|(_, v)| v.is_null()) {
                continue;
            }

            let result = check
                .expression
                .evaluate(&|p| input_value(&inputs, p))
                .map_err(|e| evaluation_failed(&ColumnPath::root(check.name.as_str()), e))?;
            match result {
                Value::Bool(true) | Value::Null => {}
                Value::Bool(false) => {
                    let values = inputs
                        .iter()
                        .map(|(p, v)| format!("{}={}", p, v))
                        .collect::<Vec<_>>()
                        .join(", ");
                    return Err(RowRejection::CheckConstraint {
                        name: check.name.clone(),
                        expression: check.expression.source().to_string(),
                        values,
                    }
                    .into());
                }
                other => {
                    return Err(RowRejection::Evaluation {
                        column: check.name.clone(),
                        reason: format!("CHECK evaluated to non-boolean value {}", other),
                    }
                    .into())
                }
            }
        }
        Ok(())
    }
}

/// Targets must be unique, non-system and addressable under the table's policies
fn validate_targets(schema: &TableSchema, targets: &[ColumnPath], options: &IndexerOptions) -> Result<()> {
    for (idx, target) in targets.iter().enumerate() {
        if targets[..idx].contains(target) {
            return Err(IndexerError::IndexerMisuse(format!(
                "Target column `{}` is listed more than once",
                target
            )));
        }
        if SystemColumns::is_reserved(target.root_name()) {
            return Err(IndexerError::IndexerMisuse(format!(
                "System column `{}` cannot be a write target",
                target
            )));
        }
        if schema.column(target).is_some() || options.access_mode == AccessMode::Read {
            continue;
        }

        // Nearest committed ancestor decides whether the target may appear
        let parent = target
            .ancestors()
            .into_iter()
            .find(|a| schema.column(a).is_some());
        if schema.policy_under(parent.as_ref()) == ColumnPolicy::Strict {
            return Err(SchemaError::column_unknown(target, parent.as_ref()).into());
        }
    }
    Ok(())
}

fn input_value(inputs: &[(ColumnPath, Value)], path: &ColumnPath) -> Value {
    inputs
        .iter()
        .find(|(p, _)| p == path)
        .map(|(_, v)| v.clone())
        .unwrap_or(Value::Null)
}

fn evaluation_failed(path: &ColumnPath, error: SchemaError) -> IndexerError {
    match error {
        SchemaError::ExpressionEvaluation { reason, .. } => RowRejection::Evaluation {
            column: path.to_string(),
            reason,
        }
        .into(),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kalamdb_schema::{DataType, ObjectType, SchemaIdAllocator, SchemaLimits, TableId};
    use serde_json::json;

    fn schema() -> Arc<TableSchema> {
        Arc::new(
            TableSchema::builder(TableId::new("app", "orders"))
                .column(ColumnDescriptor::new(ColumnPath::root("id"), DataType::BigInt))
                .column(ColumnDescriptor::new(ColumnPath::root("qty"), DataType::Int))
                .column(
                    ColumnDescriptor::new(ColumnPath::root("status"), DataType::Text)
                        .with_default("'new'")
                        .unwrap(),
                )
                .column(
                    ColumnDescriptor::new(ColumnPath::root("double_qty"), DataType::BigInt)
                        .generated("qty * 2")
                        .unwrap(),
                )
                .column(ColumnDescriptor::new(ColumnPath::root("o"), DataType::Object(ObjectType::new())))
                .column(ColumnDescriptor::new(ColumnPath::new("o", ["x"]), DataType::Int).not_null())
                .primary_key(ColumnPath::root("id"))
                .check("qty_positive", "qty > 0")
                .build(&mut SchemaIdAllocator::new(), &SchemaLimits::default())
                .unwrap(),
        )
    }

    fn indexer(targets: &[&str]) -> RowIndexer {
        let targets = targets.iter().map(|t| ColumnPath::parse(t).unwrap()).collect();
        RowIndexer::new(schema(), targets, IndexerOptions::default()).unwrap()
    }

    #[test]
    fn test_generated_and_default_values() {
        let indexer = indexer(&["id", "qty"]);
        let added = indexer.add_generated_values(&[json!(1), json!(4)]).unwrap();
        assert_eq!(
            added,
            vec![
                (ColumnPath::root("double_qty"), json!(8)),
                (ColumnPath::root("status"), json!("new")),
            ]
        );
    }

    #[test]
    fn test_explicit_null_suppresses_default() {
        let indexer = indexer(&["id", "status"]);
        let doc = indexer.index(&[json!(1), Value::Null]).unwrap();
        let status = indexer.schema().column(&ColumnPath::root("status")).unwrap();
        assert!(doc.storage.get(&status.storage_key()).is_none());

        let indexer = self::indexer(&["id"]);
        let doc = indexer.index(&[json!(1)]).unwrap();
        assert_eq!(doc.storage.get(&status.storage_key()), Some(&StoredValue::Text("new".into())));
        assert_eq!(doc.primary_key, vec![json!(1)]);
    }

    #[test]
    fn test_generated_mismatch() {
        let indexer = indexer(&["id", "qty", "double_qty"]);
        assert!(indexer.index(&[json!(1), json!(2), json!(4)]).is_ok());
        assert!(indexer.index(&[json!(1), json!(2), json!("4")]).is_ok());
        let err = indexer.index(&[json!(1), json!(2), json!(5)]).unwrap_err();
        assert!(matches!(err, IndexerError::RowRejected(RowRejection::GeneratedMismatch { .. })));
    }

    #[test]
    fn test_check_constraint_and_not_null() {
        let indexer = indexer(&["id", "qty", "o"]);
        let err = indexer.index(&[json!(1), json!(0), json!({"x": 1})]).unwrap_err();
        assert!(matches!(err, IndexerError::RowRejected(RowRejection::CheckConstraint { .. })));

        // NULL inputs do not fail the check
        assert!(indexer.index(&[json!(1), Value::Null, json!({"x": 1})]).is_ok());

        let err = indexer.index(&[json!(1), json!(1), json!({})]).unwrap_err();
        assert_eq!(
            err,
            IndexerError::RowRejected(RowRejection::NotNull { column: "o.x".into() })
        );
        // Absent parent object: nested NOT NULL does not apply
        assert!(indexer.index(&[json!(1), json!(1), Value::Null]).is_ok());

        let err = indexer.index(&[Value::Null, json!(1), Value::Null]).unwrap_err();
        assert_eq!(err, IndexerError::RowRejected(RowRejection::NotNull { column: "id".into() }));
    }

    #[test]
    fn test_rebind_rules() {
        let mut indexer = indexer(&["id"]);
        let other = Arc::new(
            TableSchema::builder(TableId::new("app", "other"))
                .column(ColumnDescriptor::new(ColumnPath::root("id"), DataType::BigInt))
                .build(&mut SchemaIdAllocator::new(), &SchemaLimits::default())
                .unwrap(),
        );
        assert!(matches!(indexer.rebind(other), Err(IndexerError::IndexerMisuse(_))));
        let same = Arc::clone(indexer.schema());
        assert!(indexer.rebind(same).is_ok());
    }

    #[test]
    fn test_invalid_targets() {
        let result = RowIndexer::new(
            schema(),
            vec![ColumnPath::root("id"), ColumnPath::root("id")],
            IndexerOptions::default(),
        );
        assert!(matches!(result, Err(IndexerError::IndexerMisuse(_))));

        let result = RowIndexer::new(schema(), vec![ColumnPath::root("_id")], IndexerOptions::default());
        assert!(matches!(result, Err(IndexerError::IndexerMisuse(_))));

        let result = RowIndexer::new(schema(), vec![ColumnPath::root("extra")], IndexerOptions::default());
        assert!(result.unwrap_err().is_column_unknown());
    }

    #[test]
    fn test_expressions_see_coerced_values() {
        let indexer = indexer(&["id", "qty"]);
        let doc = indexer.index(&[json!("1"), json!("5")]).unwrap();
        let double_qty = indexer.schema().column(&ColumnPath::root("double_qty")).unwrap();
        assert_eq!(doc.storage.get(&double_qty.storage_key()), Some(&StoredValue::Int(10)));

        let added = indexer.add_generated_values(&[json!(1), json!("3")]).unwrap();
        assert_eq!(added[0], (ColumnPath::root("double_qty"), json!(6)));

        let err = indexer.index(&[json!(1), json!("0")]).unwrap_err();
        assert!(matches!(err, IndexerError::RowRejected(RowRejection::CheckConstraint { .. })));

        // Uncoercible input is reported as a bad value, not an evaluation failure
        let err = indexer.index(&[json!(1), json!("five")]).unwrap_err();
        assert!(matches!(err, IndexerError::RowRejected(RowRejection::InvalidValue { .. })));
    }

    #[test]
    fn test_timestamps_evaluate_as_epoch_millis() {
        let schema = Arc::new(
            TableSchema::builder(TableId::new("app", "sessions"))
                .column(ColumnDescriptor::new(ColumnPath::root("started"), DataType::Timestamp))
                .column(ColumnDescriptor::new(ColumnPath::root("ended"), DataType::Timestamp))
                .column(
                    ColumnDescriptor::new(ColumnPath::root("duration"), DataType::BigInt)
                        .generated("ended - started")
                        .unwrap(),
                )
                .check("ends_after_start", "ended >= started")
                .build(&mut SchemaIdAllocator::new(), &SchemaLimits::default())
                .unwrap(),
        );
        let indexer = RowIndexer::new(
            Arc::clone(&schema),
            vec![ColumnPath::root("started"), ColumnPath::root("ended")],
            IndexerOptions::default(),
        )
        .unwrap();

        let doc = indexer
            .index(&[json!("2024-01-01T00:00:00Z"), json!("2024-01-01T00:01:00+00:00")])
            .unwrap();
        let duration = schema.column(&ColumnPath::root("duration")).unwrap();
        assert_eq!(doc.storage.get(&duration.storage_key()), Some(&StoredValue::Int(60_000)));

        let err = indexer
            .index(&[json!("2024-01-01T00:01:00Z"), json!("2024-01-01T00:00:00Z")])
            .unwrap_err();
        assert!(matches!(err, IndexerError::RowRejected(RowRejection::CheckConstraint { .. })));
    }

    #[test]
    fn test_failing_default_rejects_generated_input() {
        let schema = Arc::new(
            TableSchema::builder(TableId::new("app", "t"))
                .column(ColumnDescriptor::new(ColumnPath::root("id"), DataType::BigInt))
                .column(
                    ColumnDescriptor::new(ColumnPath::root("base"), DataType::Int)
                        .with_default("1 / 0")
                        .unwrap(),
                )
                .column(
                    ColumnDescriptor::new(ColumnPath::root("next"), DataType::Int)
                        .generated("base + 1")
                        .unwrap(),
                )
                .build(&mut SchemaIdAllocator::new(), &SchemaLimits::default())
                .unwrap(),
        );
        let indexer = RowIndexer::new(schema, vec![ColumnPath::root("id")], IndexerOptions::default()).unwrap();
        let err = indexer.add_generated_values(&[json!(1)]).unwrap_err();
        assert!(matches!(
            err,
            IndexerError::RowRejected(RowRejection::Evaluation { ref column, .. }) if column == "base"
        ));
    }
}
