//! # kalamdb-schema
//!
//! Schema layer of the KalamDB document tables.
//!
//! A [`TableSchema`] is an immutable, versioned description of a table's
//! columns. Columns are identified by a [`ColumnPath`] (root name plus nested
//! segments) and a stable [`ColumnId`] that is assigned exactly once and never
//! reused, even after the column is dropped. Storage keys are column ids, so
//! renames never rewrite stored documents.
//!
//! ```text
//! proposal (Vec<ColumnDescriptor>)
//!       ↓
//! mutator::add_columns / drop_columns / rename_column / drop_constraint
//!       ↓
//! MetadataCoordinator (single point of id allocation + version bumps)
//!       ↓
//! Arc<TableSchema> (version + 1), shared read-only by every indexer
//! ```
//!
//! ## Modules
//!
//! - [`column_path`]: dotted / subscript column paths
//! - [`datatypes`]: storage types, including object inner-type records
//! - [`column_definition`]: column descriptors (plain, default, generated)
//! - [`table_schema`]: the schema aggregate and its builder
//! - [`mutator`]: pure functions producing a new schema version
//! - [`type_resolver`]: type inference from observed values and widening rules
//! - [`expression`]: SQL scalar expressions used by defaults, generated columns
//!   and check constraints
//! - [`coordinator`]: the metadata coordinator contract and an in-process
//!   implementation

pub mod column_definition;
pub mod column_path;
pub mod column_policy;
pub mod constraints;
pub mod coordinator;
pub mod datatypes;
pub mod error;
pub mod expression;
pub mod id_allocator;
pub mod ids;
pub mod mutator;
pub mod system_columns;
pub mod table_schema;
pub mod type_resolver;

pub use column_definition::{ColumnDescriptor, ColumnKind, IndexMode};
pub use column_path::ColumnPath;
pub use column_policy::ColumnPolicy;
pub use constraints::{Analyzer, CheckConstraint, CheckConstraintDef, IndexColumn};
pub use coordinator::{LocalMetadataCoordinator, MetadataCoordinator};
pub use datatypes::{DataType, ObjectType};
pub use error::{Result, SchemaError};
pub use expression::{values_equal, BoundExpression};
pub use id_allocator::{ColumnIdAllocator, SchemaIdAllocator};
pub use ids::{ColumnId, TableId};
pub use mutator::DropColumn;
pub use system_columns::SystemColumns;
pub use table_schema::{ColumnResolver, SchemaLimits, TableSchema, TableSchemaBuilder};
pub use type_resolver::{TypeResolver, Widening};
