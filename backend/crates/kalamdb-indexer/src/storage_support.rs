//! Value indexers: stored values to typed search fields
//!
//! One indexer tree is built per root column from its descriptor. The same
//! trees serve live indexing and replay, so both produce identical fields.
//!
//! ```text
//! OBJECT      -> ObjectIndexer { child id -> indexer }
//! ARRAY(T)    -> ArrayIndexer  { optional length field, element indexer }
//! ARRAY(OBJ)  -> inside another object array: BlobIndexer (one blob per occurrence)
//! scalar      -> ScalarIndexer (Long / Double / Bool / Keyword)
//! INDEX OFF   -> NoopIndexer
//! ```

use std::collections::HashMap;
use std::fmt;

use kalamdb_schema::{
    Analyzer, ColumnDescriptor, ColumnPath, ColumnResolver, DataType, IndexColumn, IndexMode,
    SystemColumns, TableId, TableSchema,
};

use crate::error::{IndexerError, Result};
use crate::search_field::{FieldValue, SearchField};
use crate::settings::IndexerOptions;
use crate::storage_form::{is_unresolved_key, StorageDocument, StoredValue};

/// Turns one stored value into zero or more search fields
pub trait ValueIndexer: Send + Sync + fmt::Debug {
    fn index_value(&self, value: &StoredValue, fields: &mut Vec<SearchField>) -> Result<()>;
}

/// Where a type occurs when asking for its value indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypePosition {
    Column,
    /// Element of an (already flattened) array
    ArrayElement,
}

#[derive(Debug, Clone, Copy, Default)]
struct Scope {
    in_array: bool,
    in_object_array: bool,
}

/// Registry of value indexers per column type
#[derive(Debug, Clone)]
pub struct StorageSupport {
    array_length_min_version: u64,
}

impl StorageSupport {
    pub fn new(options: &IndexerOptions) -> Self {
        Self {
            array_length_min_version: options.array_length_min_version,
        }
    }

    /// Indexer for a scalar type.
    ///
    /// Arrays never reach an element position: the array indexer flattens
    /// nested arrays before handing out elements.
    pub fn for_type(&self, field: &str, data_type: &DataType, position: TypePosition) -> Result<Box<dyn ValueIndexer>> {
        let kind = match data_type {
            DataType::Boolean => ScalarKind::Bool,
            DataType::SmallInt | DataType::Int | DataType::BigInt | DataType::Timestamp => ScalarKind::Long,
            DataType::Float | DataType::Double => ScalarKind::Double,
            DataType::Text => ScalarKind::Keyword,
            DataType::Undefined => return Ok(Box::new(NoopIndexer)),
            DataType::Array(_) if position == TypePosition::ArrayElement => {
                return Err(IndexerError::IndexerMisuse(format!(
                    "Nested array type {} requested as an array element of field {}",
                    data_type, field
                )))
            }
            DataType::Array(_) | DataType::Object(_) => {
                return Err(IndexerError::IndexerMisuse(format!(
                    "{} is not a scalar type (field {})",
                    data_type, field
                )))
            }
        };
        Ok(Box::new(ScalarIndexer {
            field: field.to_string(),
            kind,
        }))
    }

    /// Indexer for a committed column and everything below it
    pub fn value_indexer(
        &self,
        table_id: &TableId,
        column: &ColumnDescriptor,
        resolver: &dyn ColumnResolver,
    ) -> Result<Box<dyn ValueIndexer>> {
        log::trace!("Building value indexer for {}.{} ({})", table_id, column.path, column.data_type);
        self.build(column, resolver, Scope::default())
    }

    fn build(&self, column: &ColumnDescriptor, resolver: &dyn ColumnResolver, scope: Scope) -> Result<Box<dyn ValueIndexer>> {
        // Off covers the whole subtree
        if column.index_mode == IndexMode::Off {
            return Ok(Box::new(NoopIndexer));
        }
        let field = column.storage_key();
        match &column.data_type {
            DataType::Object(_) => Ok(Box::new(self.object_indexer(&column.path, resolver, scope)?)),
            DataType::Array(_) => {
                let length_field = (!scope.in_array
                    && column.since_version >= self.array_length_min_version)
                    .then(|| format!("{}{}", SystemColumns::ARRAY_LENGTH_PREFIX, field));

                let element: Box<dyn ValueIndexer> = match column.data_type.innermost() {
                    DataType::Object(_) if scope.in_object_array => {
                        return Ok(Box::new(BlobIndexer { field }));
                    }
                    DataType::Object(_) => Box::new(self.object_indexer(
                        &column.path,
                        resolver,
                        Scope {
                            in_array: true,
                            in_object_array: true,
                        },
                    )?),
                    scalar => self.for_type(&field, scalar, TypePosition::ArrayElement)?,
                };
                Ok(Box::new(ArrayIndexer { length_field, element }))
            }
            scalar => self.for_type(&field, scalar, TypePosition::Column),
        }
    }

    fn object_indexer(&self, path: &ColumnPath, resolver: &dyn ColumnResolver, scope: Scope) -> Result<ObjectIndexer> {
        let mut children = HashMap::new();
        for child in resolver.children_of(path) {
            children.insert(child.storage_key(), self.build(child, resolver, scope)?);
        }
        Ok(ObjectIndexer { children })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarKind {
    Bool,
    Long,
    Double,
    Keyword,
}

#[derive(Debug)]
struct ScalarIndexer {
    field: String,
    kind: ScalarKind,
}

impl ValueIndexer for ScalarIndexer {
    fn index_value(&self, value: &StoredValue, fields: &mut Vec<SearchField>) -> Result<()> {
        let field_value = match (self.kind, value) {
            (_, StoredValue::Null) => return Ok(()),
            (ScalarKind::Bool, StoredValue::Bool(b)) => FieldValue::Bool(*b),
            (ScalarKind::Long, StoredValue::Int(i)) => FieldValue::Long(*i),
            (ScalarKind::Double, StoredValue::Float(f)) => FieldValue::Double(*f),
            (ScalarKind::Double, StoredValue::Int(i)) => FieldValue::Double(*i as f64),
            (ScalarKind::Keyword, StoredValue::Text(s)) => FieldValue::Keyword(s.clone()),
            (kind, other) => {
                return Err(IndexerError::IndexerMisuse(format!(
                    "Stored value {:?} does not match {:?} field {}",
                    other, kind, self.field
                )))
            }
        };
        fields.push(SearchField::new(self.field.clone(), field_value));
        Ok(())
    }
}

#[derive(Debug)]
struct NoopIndexer;

impl ValueIndexer for NoopIndexer {
    fn index_value(&self, _value: &StoredValue, _fields: &mut Vec<SearchField>) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct ArrayIndexer {
    /// Set only for the outermost array of a column
    length_field: Option<String>,
    element: Box<dyn ValueIndexer>,
}

impl ArrayIndexer {
    fn flatten(&self, items: &[StoredValue], fields: &mut Vec<SearchField>) -> Result<()> {
        for item in items {
            match item {
                StoredValue::Array(inner) => self.flatten(inner, fields)?,
                StoredValue::Null => {}
                other => self.element.index_value(other, fields)?,
            }
        }
        Ok(())
    }
}

impl ValueIndexer for ArrayIndexer {
    fn index_value(&self, value: &StoredValue, fields: &mut Vec<SearchField>) -> Result<()> {
        let items = match value {
            StoredValue::Null => return Ok(()),
            StoredValue::Array(items) => items,
            other => {
                return Err(IndexerError::IndexerMisuse(format!(
                    "Expected a stored array, got {:?}",
                    other
                )))
            }
        };
        if let Some(name) = &self.length_field {
            fields.push(SearchField::new(name.clone(), FieldValue::Long(items.len() as i64)));
        }
        self.flatten(items, fields)
    }
}

#[derive(Debug)]
struct ObjectIndexer {
    children: HashMap<String, Box<dyn ValueIndexer>>,
}

impl ValueIndexer for ObjectIndexer {
    fn index_value(&self, value: &StoredValue, fields: &mut Vec<SearchField>) -> Result<()> {
        let entries = match value {
            StoredValue::Null => return Ok(()),
            StoredValue::Object(entries) => entries,
            other => {
                return Err(IndexerError::IndexerMisuse(format!(
                    "Expected a stored object, got {:?}",
                    other
                )))
            }
        };
        index_entries(&self.children, entries, fields)
    }
}

/// Object arrays nested in object arrays are not individually addressable
#[derive(Debug)]
struct BlobIndexer {
    field: String,
}

impl ValueIndexer for BlobIndexer {
    fn index_value(&self, value: &StoredValue, fields: &mut Vec<SearchField>) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())?;
        fields.push(SearchField::new(self.field.clone(), FieldValue::Blob(bytes)));
        Ok(())
    }
}

fn index_entries(
    indexers: &HashMap<String, Box<dyn ValueIndexer>>,
    entries: &[(String, StoredValue)],
    fields: &mut Vec<SearchField>,
) -> Result<()> {
    for (key, value) in entries {
        if is_unresolved_key(key) {
            continue;
        }
        match indexers.get(key) {
            Some(indexer) => indexer.index_value(value, fields)?,
            None => log::trace!("No indexer for stored key {}, skipping", key),
        }
    }
    Ok(())
}

/// Full-text index column: analyzed tokens of its text sources
#[derive(Debug)]
struct FulltextIndexer {
    field: String,
    analyzer: Analyzer,
    /// Storage-key path of each source column
    sources: Vec<Vec<String>>,
}

impl FulltextIndexer {
    fn new(index: &IndexColumn, schema: &TableSchema) -> Result<Self> {
        let mut sources = Vec::with_capacity(index.sources.len());
        for source in &index.sources {
            let mut keys = Vec::with_capacity(source.depth());
            let mut prefix: Option<ColumnPath> = None;
            for segment in source.segments() {
                let path = match &prefix {
                    Some(p) => p.child(segment.as_str()),
                    None => ColumnPath::root(segment.as_str()),
                };
                let column = schema.column(&path).ok_or_else(|| {
                    IndexerError::IndexerMisuse(format!(
                        "Source `{}` of index column {} is not in the schema",
                        source, index.name
                    ))
                })?;
                keys.push(column.storage_key());
                prefix = Some(path);
            }
            sources.push(keys);
        }
        Ok(Self {
            field: index.column_id.storage_key(),
            analyzer: index.analyzer,
            sources,
        })
    }

    fn emit(&self, document: &StorageDocument, fields: &mut Vec<SearchField>) {
        let mut texts = Vec::new();
        for keys in &self.sources {
            let Some((first, rest)) = keys.split_first() else {
                continue;
            };
            if let Some(value) = document.get(first) {
                collect_texts(value, rest, &mut texts);
            }
        }
        for text in texts {
            for token in self.analyzer.tokenize(text) {
                fields.push(SearchField::new(self.field.clone(), FieldValue::Text(token)));
            }
        }
    }
}

fn collect_texts<'a>(value: &'a StoredValue, keys: &[String], out: &mut Vec<&'a str>) {
    match (value, keys.split_first()) {
        (StoredValue::Array(items), _) => {
            for item in items {
                collect_texts(item, keys, out);
            }
        }
        (StoredValue::Text(text), None) => out.push(text),
        (StoredValue::Object(_), Some((key, rest))) => {
            if let Some(child) = value.get(key) {
                collect_texts(child, rest, out);
            }
        }
        _ => {}
    }
}

/// Search fields for whole stored documents of one schema version
#[derive(Debug)]
pub struct SearchFieldEmitter {
    roots: HashMap<String, Box<dyn ValueIndexer>>,
    fulltext: Vec<FulltextIndexer>,
}

impl SearchFieldEmitter {
    pub fn for_schema(schema: &TableSchema, support: &StorageSupport) -> Result<Self> {
        let mut roots = HashMap::new();
        for column in schema.root_columns() {
            if schema.is_partition_column(&column.path) {
                continue;
            }
            roots.insert(
                column.storage_key(),
                support.value_indexer(schema.table_id(), column, schema)?,
            );
        }
        let fulltext = schema
            .index_columns()
            .iter()
            .map(|index| FulltextIndexer::new(index, schema))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { roots, fulltext })
    }

    /// Fields in stored-document order, full-text fields last
    pub fn emit(&self, document: &StorageDocument) -> Result<Vec<SearchField>> {
        let mut fields = Vec::new();
        index_entries(&self.roots, document.entries(), &mut fields)?;
        for index in &self.fulltext {
            index.emit(document, &mut fields);
        }
        Ok(fields)
    }
}
