//! ReplayIndexer - re-derive search fields from stored documents

use std::sync::Arc;

use serde_json::{Map, Value};

use kalamdb_schema::{ColumnDescriptor, ColumnId, ColumnPath, TableSchema};

use crate::error::Result;
use crate::search_field::SearchField;
use crate::settings::IndexerOptions;
use crate::storage_form::{is_unresolved_key, StorageDocument, StoredValue};
use crate::storage_support::{SearchFieldEmitter, StorageSupport};

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayedDocument {
    pub storage: StorageDocument,
    pub fields: Vec<SearchField>,
}

/// Decodes documents written under one schema version.
///
/// Uses the same value indexers as [`crate::RowIndexer`], so replaying a
/// document yields exactly the fields produced when it was written.
#[derive(Debug)]
pub struct ReplayIndexer {
    schema: Arc<TableSchema>,
    emitter: SearchFieldEmitter,
}

impl ReplayIndexer {
    pub fn new(schema: Arc<TableSchema>, options: &IndexerOptions) -> Result<Self> {
        let emitter = SearchFieldEmitter::for_schema(&schema, &StorageSupport::new(options))?;
        Ok(Self { schema, emitter })
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn decode(&self, source: &[u8]) -> Result<ReplayedDocument> {
        let storage = StorageDocument::from_bytes(source)?;
        let fields = self.emitter.emit(&storage)?;
        Ok(ReplayedDocument { storage, fields })
    }

    pub fn decode_document(&self, storage: &StorageDocument) -> Result<Vec<SearchField>> {
        self.emitter.emit(storage)
    }

    /// Stored values keyed by the current column names.
    ///
    /// Keys of dropped columns and values stored before their column was
    /// committed are left out.
    pub fn column_values(&self, storage: &StorageDocument) -> Vec<(ColumnPath, Value)> {
        let mut values = Vec::new();
        for (key, value) in storage.entries() {
            match self.resolve_key(None, key) {
                Some(column) => values.push((column.path.clone(), self.named_json(column, value))),
                None => log::trace!("Stored key {} has no live column in {}", key, self.schema.table_id()),
            }
        }
        values
    }

    fn resolve_key(&self, parent: Option<&ColumnPath>, key: &str) -> Option<&ColumnDescriptor> {
        if is_unresolved_key(key) {
            return None;
        }
        let id = ColumnId::from_storage_key(key)?;
        let column = self.schema.column_by_id(id)?;
        (column.path.parent().as_ref() == parent).then_some(column)
    }

    fn named_json(&self, column: &ColumnDescriptor, value: &StoredValue) -> Value {
        match value {
            StoredValue::Object(entries) => {
                let mut map = Map::new();
                for (key, child_value) in entries {
                    if let Some(child) = self.resolve_key(Some(&column.path), key) {
                        map.insert(child.name().to_string(), self.named_json(child, child_value));
                    }
                }
                Value::Object(map)
            }
            StoredValue::Array(items) => {
                Value::Array(items.iter().map(|item| self.named_json(column, item)).collect())
            }
            scalar => scalar.to_json(),
        }
    }
}
