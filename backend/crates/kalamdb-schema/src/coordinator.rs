//! MetadataCoordinator - single point of schema commits
//!
//! Every schema change for a table goes through the coordinator, which
//! serialises mutations per table, allocates column ids and positions, and
//! keeps each committed version so older write-ahead-log segments can be
//! decoded against the schema they were written with.
//!
//! ```text
//! shard A ─┐  commit_add_columns(proposal)        ┌─> Arc<TableSchema> v+1
//! shard B ─┼──────────────> per-table lock ───────┤
//! shard C ─┘  (duplicate proposals collapse)      └─> history[v+1]
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::column_definition::ColumnDescriptor;
use crate::column_path::ColumnPath;
use crate::constraints::CheckConstraintDef;
use crate::error::{Result, SchemaError};
use crate::id_allocator::SchemaIdAllocator;
use crate::ids::TableId;
use crate::mutator::{self, DropColumn};
use crate::table_schema::{SchemaLimits, TableSchema, TableSchemaBuilder};

/// Durably applies schema mutations and hands back authoritative schemas.
pub trait MetadataCoordinator: Send + Sync {
    /// Latest committed schema
    fn schema(&self, table_id: &TableId) -> Result<Arc<TableSchema>>;

    /// Schema as committed at `version`
    fn schema_at(&self, table_id: &TableId, version: u64) -> Result<Arc<TableSchema>>;

    fn commit_add_columns(
        &self,
        table_id: &TableId,
        proposed: Vec<ColumnDescriptor>,
        pk_indices: &[usize],
        new_checks: Vec<CheckConstraintDef>,
    ) -> Result<Arc<TableSchema>>;

    fn commit_drop_columns(&self, table_id: &TableId, targets: &[DropColumn]) -> Result<Arc<TableSchema>>;

    fn commit_rename_column(
        &self,
        table_id: &TableId,
        target: &ColumnPath,
        new_name: &str,
    ) -> Result<Arc<TableSchema>>;

    fn commit_drop_constraint(&self, table_id: &TableId, name: &str) -> Result<Arc<TableSchema>>;
}

#[derive(Debug)]
struct TableEntry {
    current: Arc<TableSchema>,
    history: BTreeMap<u64, Arc<TableSchema>>,
    allocator: SchemaIdAllocator,
}

/// In-process coordinator for a single node (and for tests).
///
/// Uses one lock per table; mutations on different tables never contend.
#[derive(Debug)]
pub struct LocalMetadataCoordinator {
    tables: DashMap<TableId, Arc<Mutex<TableEntry>>>,
    limits: SchemaLimits,
}

impl Default for LocalMetadataCoordinator {
    fn default() -> Self {
        Self::new(SchemaLimits::default())
    }
}

impl LocalMetadataCoordinator {
    pub fn new(limits: SchemaLimits) -> Self {
        Self {
            tables: DashMap::new(),
            limits,
        }
    }

    pub fn limits(&self) -> &SchemaLimits {
        &self.limits
    }

    /// Build and register the first version of a table
    pub fn create_table(&self, builder: TableSchemaBuilder) -> Result<Arc<TableSchema>> {
        let table_id = builder.table_id().clone();
        if self.tables.contains_key(&table_id) {
            return Err(SchemaError::TableAlreadyExists(table_id.to_string()));
        }

        let mut allocator = SchemaIdAllocator::new();
        let schema = Arc::new(builder.build(&mut allocator, &self.limits)?);

        let mut history = BTreeMap::new();
        history.insert(schema.version(), Arc::clone(&schema));
        let entry = TableEntry {
            current: Arc::clone(&schema),
            history,
            allocator,
        };

        match self.tables.entry(table_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(SchemaError::TableAlreadyExists(table_id.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(entry)));
                log::info!("Created table {} (schema version {})", table_id, schema.version());
                Ok(schema)
            }
        }
    }

    pub fn drop_table(&self, table_id: &TableId) -> Result<()> {
        self.tables
            .remove(table_id)
            .map(|_| ())
            .ok_or_else(|| SchemaError::TableNotFound(table_id.to_string()))
    }

    fn entry(&self, table_id: &TableId) -> Result<Arc<Mutex<TableEntry>>> {
        // Clone the Arc so the DashMap shard lock is released before locking the table
        self.tables
            .get(table_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| SchemaError::TableNotFound(table_id.to_string()))
    }

    /// Apply `mutation` under the table lock and record the result if it
    /// produced a new version.
    fn apply<F>(&self, table_id: &TableId, operation: &str, mutation: F) -> Result<Arc<TableSchema>>
    where
        F: FnOnce(&Arc<TableSchema>, &mut SchemaIdAllocator, &SchemaLimits) -> Result<Arc<TableSchema>>,
    {
        let entry = self.entry(table_id)?;
        let mut guard = entry.lock();
        let entry = &mut *guard;

        let next = match mutation(&entry.current, &mut entry.allocator, &self.limits) {
            Ok(next) => next,
            Err(e) => {
                log::warn!("{} on {} rejected: {}", operation, table_id, e);
                return Err(e);
            }
        };
        if Arc::ptr_eq(&next, &entry.current) {
            log::trace!("{} on {} was a no-op", operation, table_id);
            return Ok(next);
        }

        entry.history.insert(next.version(), Arc::clone(&next));
        entry.current = Arc::clone(&next);
        log::info!(
            "{} committed on {}: schema version {}",
            operation,
            table_id,
            next.version()
        );
        Ok(next)
    }
}

impl MetadataCoordinator for LocalMetadataCoordinator {
    fn schema(&self, table_id: &TableId) -> Result<Arc<TableSchema>> {
        let entry = self.entry(table_id)?;
        let current = Arc::clone(&entry.lock().current);
        Ok(current)
    }

    fn schema_at(&self, table_id: &TableId, version: u64) -> Result<Arc<TableSchema>> {
        let entry = self.entry(table_id)?;
        let entry = entry.lock();
        entry
            .history
            .get(&version)
            .cloned()
            .ok_or_else(|| SchemaError::VersionNotFound {
                table: table_id.to_string(),
                version,
            })
    }

    fn commit_add_columns(
        &self,
        table_id: &TableId,
        proposed: Vec<ColumnDescriptor>,
        pk_indices: &[usize],
        new_checks: Vec<CheckConstraintDef>,
    ) -> Result<Arc<TableSchema>> {
        self.apply(table_id, "ADD COLUMN", |schema, allocator, limits| {
            mutator::add_columns(schema, proposed, pk_indices, new_checks, allocator, limits)
        })
    }

    fn commit_drop_columns(&self, table_id: &TableId, targets: &[DropColumn]) -> Result<Arc<TableSchema>> {
        self.apply(table_id, "DROP COLUMN", |schema, _, _| {
            mutator::drop_columns(schema, targets)
        })
    }

    fn commit_rename_column(
        &self,
        table_id: &TableId,
        target: &ColumnPath,
        new_name: &str,
    ) -> Result<Arc<TableSchema>> {
        self.apply(table_id, "RENAME COLUMN", |schema, _, _| {
            mutator::rename_column(schema, target, new_name)
        })
    }

    fn commit_drop_constraint(&self, table_id: &TableId, name: &str) -> Result<Arc<TableSchema>> {
        self.apply(table_id, "DROP CONSTRAINT", |schema, _, _| {
            Ok(mutator::drop_constraint(schema, name))
        })
    }
}
