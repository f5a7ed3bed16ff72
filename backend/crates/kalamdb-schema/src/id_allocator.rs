//! Column id and position allocation
//!
//! Ids and positions only ever grow. The allocator for an existing schema
//! resumes after the highest id and position ever handed out, tombstones and
//! index columns included, so a dropped column's id is never reused.

use crate::ids::ColumnId;
use crate::table_schema::TableSchema;

pub trait ColumnIdAllocator {
    fn next_column_id(&mut self) -> ColumnId;
    fn next_position(&mut self) -> i32;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIdAllocator {
    next_id: u64,
    next_position: i32,
}

impl SchemaIdAllocator {
    /// Allocator for a brand-new table
    pub fn new() -> Self {
        Self {
            next_id: 1,
            next_position: 1,
        }
    }

    pub fn for_schema(schema: &TableSchema) -> Self {
        let mut allocator = Self::new();
        for column in schema.columns().chain(schema.dropped_columns().iter()) {
            allocator.observe(column.column_id, column.position);
        }
        for index in schema.index_columns() {
            allocator.observe(index.column_id, 0);
        }
        allocator
    }

    /// Make sure `id` and `position` are never handed out again
    pub fn observe(&mut self, id: ColumnId, position: i32) {
        self.next_id = self.next_id.max(id.as_u64() + 1);
        self.next_position = self.next_position.max(position + 1);
    }
}

impl Default for SchemaIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnIdAllocator for SchemaIdAllocator {
    fn next_column_id(&mut self) -> ColumnId {
        let id = ColumnId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn next_position(&mut self) -> i32 {
        let position = self.next_position;
        self.next_position += 1;
        position
    }
}
