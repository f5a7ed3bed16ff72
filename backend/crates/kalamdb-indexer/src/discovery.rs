//! Column discovery: find keys of a row that the schema does not know yet

use serde_json::{Map, Value};

use kalamdb_schema::{
    ColumnDescriptor, ColumnPath, ColumnPolicy, SchemaError, SystemColumns, TableSchema, TypeResolver, Widening,
};

use crate::error::Result;
use crate::row::RowTree;
use crate::settings::{AccessMode, IndexerOptions};

/// Walks one row tree and collects staged descriptors.
///
/// Staged descriptors are either new columns (unassigned id, negative
/// placeholder position) or widenings of existing ones (same id and
/// position, more specific type). Parents always precede their children.
pub(crate) struct ColumnDiscovery<'a> {
    schema: &'a TableSchema,
    options: &'a IndexerOptions,
    staged: Vec<ColumnDescriptor>,
    next_placeholder: i32,
}

impl<'a> ColumnDiscovery<'a> {
    pub fn new(schema: &'a TableSchema, options: &'a IndexerOptions) -> Self {
        Self {
            schema,
            options,
            staged: Vec::new(),
            next_placeholder: -1,
        }
    }

    pub fn discover(mut self, tree: &RowTree) -> Result<Vec<ColumnDescriptor>> {
        self.walk_object(None, tree)?;
        Ok(self.staged)
    }

    /// Staged descriptors shadow committed ones
    fn lookup(&self, path: &ColumnPath) -> Option<&ColumnDescriptor> {
        self.staged
            .iter()
            .find(|c| &c.path == path)
            .or_else(|| self.schema.column(path))
    }

    fn walk_object(&mut self, parent: Option<&ColumnPath>, object: &Map<String, Value>) -> Result<()> {
        let policy = match parent {
            None => self.schema.column_policy(),
            Some(path) => self.lookup(path).map(|c| c.policy()).unwrap_or(ColumnPolicy::Dynamic),
        };

        for (key, value) in object {
            if value.is_null() {
                continue;
            }
            if parent.is_none() && SystemColumns::is_reserved(key) {
                continue;
            }
            let path = match parent {
                Some(p) => p.child(key.as_str()),
                None => ColumnPath::root(key.as_str()),
            };

            if let Some(known) = self.lookup(&path).cloned() {
                self.visit_known(&known, value)?;
                continue;
            }

            match policy {
                ColumnPolicy::Strict => {
                    if self.options.rejects_unknown() {
                        return Err(SchemaError::column_unknown(&path, parent).into());
                    }
                    log::trace!("Unknown key `{}` under STRICT parent ignored for read", path);
                }
                ColumnPolicy::Ignored => {}
                ColumnPolicy::Dynamic => {
                    if self.options.access_mode == AccessMode::Read {
                        if self.options.rejects_unknown() {
                            return Err(SchemaError::column_unknown(&path, parent).into());
                        }
                        continue;
                    }
                    if let Some(data_type) = TypeResolver::infer(&path, value)? {
                        let position = self.next_placeholder;
                        self.next_placeholder -= 1;
                        log::trace!("Staging new column `{}` ({})", path, data_type);
                        self.staged
                            .push(ColumnDescriptor::new(path.clone(), data_type).with_position(position));
                        self.visit_children(&path, value)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn visit_known(&mut self, known: &ColumnDescriptor, value: &Value) -> Result<()> {
        if known.data_type.contains_undefined() {
            if let Some(observed) = TypeResolver::infer(&known.path, value)? {
                if let Widening::Widened(data_type) = TypeResolver::widen(&known.path, &known.data_type, &observed)? {
                    self.stage_widening(known, data_type);
                }
            }
        }
        self.visit_children(&known.path, value)
    }

    fn stage_widening(&mut self, known: &ColumnDescriptor, data_type: kalamdb_schema::DataType) {
        log::trace!("Staging widening of `{}` to {}", known.path, data_type);
        match self.staged.iter_mut().find(|c| c.path == known.path) {
            Some(staged) => staged.data_type = data_type,
            None => {
                let mut widened = known.clone();
                widened.data_type = data_type;
                self.staged.push(widened);
            }
        }
    }

    fn visit_children(&mut self, path: &ColumnPath, value: &Value) -> Result<()> {
        let holds_objects = self
            .lookup(path)
            .map(|c| c.data_type.holds_objects())
            .unwrap_or(false);
        if !holds_objects {
            return Ok(());
        }
        match value {
            Value::Object(map) => self.walk_object(Some(path), map),
            Value::Array(items) => {
                for item in items {
                    self.visit_children(path, item)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::build_row_tree;
    use kalamdb_schema::{DataType, ObjectType, SchemaIdAllocator, SchemaLimits, TableId};
    use serde_json::json;

    fn schema(policy: ColumnPolicy) -> TableSchema {
        TableSchema::builder(TableId::new("app", "t"))
            .column(ColumnDescriptor::new(ColumnPath::root("id"), DataType::BigInt))
            .column(
                ColumnDescriptor::new(ColumnPath::root("o"), DataType::Object(ObjectType::new())).with_policy(policy),
            )
            .column(ColumnDescriptor::new(ColumnPath::new("o", ["a"]), DataType::Int))
            .column(ColumnDescriptor::new(ColumnPath::root("tags"), DataType::array_of(DataType::Undefined)))
            .column_policy(ColumnPolicy::Dynamic)
            .build(&mut SchemaIdAllocator::new(), &SchemaLimits::default())
            .unwrap()
    }

    fn discover(schema: &TableSchema, options: &IndexerOptions, row: Value) -> Result<Vec<ColumnDescriptor>> {
        let Value::Object(tree) = row else { unreachable!() };
        ColumnDiscovery::new(schema, options).discover(&tree)
    }

    #[test]
    fn test_new_nested_object_parents_first() {
        let schema = schema(ColumnPolicy::Dynamic);
        let staged = discover(
            &schema,
            &IndexerOptions::default(),
            json!({"id": 1, "p": {"z": "x", "q": {"n": 1.5}}, "nothing": null}),
        )
        .unwrap();
        let paths: Vec<String> = staged.iter().map(|c| c.path.to_string()).collect();
        assert_eq!(paths, vec!["p", "p.q", "p.q.n", "p.z"]);
        assert!(staged.iter().all(|c| c.is_staged() && c.position < 0));
        assert_eq!(staged[2].data_type, DataType::Double);
    }

    #[test]
    fn test_strict_rejects_dynamic_stages() {
        let strict = schema(ColumnPolicy::Strict);
        let err = discover(&strict, &IndexerOptions::default(), json!({"o": {"a": 1, "b": 2}})).unwrap_err();
        assert!(err.is_column_unknown());

        let read = IndexerOptions::default().for_read();
        assert!(discover(&strict, &read, json!({"o": {"b": 2}})).unwrap().is_empty());

        let dynamic = schema(ColumnPolicy::Dynamic);
        let staged = discover(&dynamic, &IndexerOptions::default(), json!({"o": {"a": 1, "b": 2}})).unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].path, ColumnPath::new("o", ["b"]));

        let ignored = schema(ColumnPolicy::Ignored);
        assert!(discover(&ignored, &IndexerOptions::default(), json!({"o": {"b": 2}})).unwrap().is_empty());
    }

    #[test]
    fn test_undefined_array_widening_keeps_identity() {
        let schema = schema(ColumnPolicy::Dynamic);
        let tags = schema.column(&ColumnPath::root("tags")).unwrap().clone();
        let tree = build_row_tree(&[ColumnPath::root("tags")], &[json!(["a", "b"])]).unwrap();
        let staged = ColumnDiscovery::new(&schema, &IndexerOptions::default()).discover(&tree).unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].column_id, tags.column_id);
        assert_eq!(staged[0].position, tags.position);
        assert_eq!(staged[0].data_type, DataType::array_of(DataType::Text));

        let empty = discover(&schema, &IndexerOptions::default(), json!({"tags": []})).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_object_array_children_deduplicated() {
        let schema = schema(ColumnPolicy::Dynamic);
        let staged = discover(
            &schema,
            &IndexerOptions::default(),
            json!({"items": [{"k": 1}, {"k": 2, "v": "x"}]}),
        )
        .unwrap();
        let paths: Vec<String> = staged.iter().map(|c| c.path.to_string()).collect();
        assert_eq!(paths, vec!["items", "items.k", "items.v"]);
    }
}
