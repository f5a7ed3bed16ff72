//! Table schema aggregate
//!
//! A `TableSchema` is immutable once built. Every mutation (see
//! [`crate::mutator`]) produces a new instance with `version + 1`, and
//! readers hold `Arc<TableSchema>` snapshots.
//!
//! Columns live in a `BTreeMap` keyed by [`ColumnPath`]. Because paths sort
//! segment by segment, the subtree of a column is a contiguous range starting
//! at the column itself.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::column_definition::ColumnDescriptor;
use crate::column_path::ColumnPath;
use crate::column_policy::ColumnPolicy;
use crate::constraints::{CheckConstraint, CheckConstraintDef, IndexColumn};
use crate::datatypes::{DataType, ObjectType};
use crate::error::{Result, SchemaError};
use crate::expression::BoundExpression;
use crate::id_allocator::ColumnIdAllocator;
use crate::ids::{ColumnId, TableId};
use crate::system_columns::SystemColumns;

/// Table-wide structural limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaLimits {
    /// Maximum number of columns, nested columns included
    pub max_columns: usize,
    /// Maximum path depth, 1 for top-level columns
    pub max_depth: usize,
}

impl Default for SchemaLimits {
    fn default() -> Self {
        Self {
            max_columns: 1000,
            max_depth: 20,
        }
    }
}

/// Resolves column paths to descriptors.
///
/// Implemented by [`TableSchema`]; writers overlay staged (uncommitted)
/// descriptors on top of it.
pub trait ColumnResolver {
    fn resolve(&self, path: &ColumnPath) -> Option<&ColumnDescriptor>;

    /// Direct children in position order
    fn children_of(&self, parent: &ColumnPath) -> Vec<&ColumnDescriptor>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub(crate) table_id: TableId,
    pub(crate) columns: BTreeMap<ColumnPath, ColumnDescriptor>,
    pub(crate) dropped_columns: Vec<ColumnDescriptor>,
    pub(crate) index_columns: Vec<IndexColumn>,
    pub(crate) primary_key: Vec<ColumnPath>,
    pub(crate) auto_generated_pk: bool,
    pub(crate) check_constraints: Vec<CheckConstraint>,
    pub(crate) partitioned_by: Vec<ColumnPath>,
    pub(crate) clustered_by: Option<ColumnPath>,
    pub(crate) column_policy: ColumnPolicy,
    pub(crate) version: u64,
}

impl TableSchema {
    pub fn builder(table_id: TableId) -> TableSchemaBuilder {
        TableSchemaBuilder::new(table_id)
    }

    pub fn table_id(&self) -> &TableId {
        &self.table_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn column(&self, path: &ColumnPath) -> Option<&ColumnDescriptor> {
        self.columns.get(path)
    }

    pub fn column_by_id(&self, id: ColumnId) -> Option<&ColumnDescriptor> {
        self.columns.values().find(|c| c.column_id == id)
    }

    /// All live columns in path order
    pub fn columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.values()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Top-level columns in position order
    pub fn root_columns(&self) -> Vec<&ColumnDescriptor> {
        let mut roots: Vec<_> = self.columns.values().filter(|c| c.is_root()).collect();
        roots.sort_by_key(|c| c.position);
        roots
    }

    /// Direct children of `parent` in position order
    pub fn children(&self, parent: &ColumnPath) -> Vec<&ColumnDescriptor> {
        children_in(&self.columns, parent)
    }

    /// The column at `path` followed by all of its descendants
    pub fn subtree<'a>(&'a self, path: &'a ColumnPath) -> impl Iterator<Item = &'a ColumnDescriptor> {
        self.columns
            .range(path.clone()..)
            .take_while(move |(p, _)| p.is_within(path))
            .map(|(_, c)| c)
    }

    pub fn dropped_columns(&self) -> &[ColumnDescriptor] {
        &self.dropped_columns
    }

    pub fn is_dropped(&self, path: &ColumnPath) -> bool {
        !self.columns.contains_key(path) && self.dropped_columns.iter().any(|c| &c.path == path)
    }

    pub fn dropped_by_id(&self, id: ColumnId) -> Option<&ColumnDescriptor> {
        self.dropped_columns.iter().find(|c| c.column_id == id)
    }

    pub fn index_columns(&self) -> &[IndexColumn] {
        &self.index_columns
    }

    pub fn index_column(&self, name: &str) -> Option<&IndexColumn> {
        self.index_columns.iter().find(|i| i.name == name)
    }

    pub fn primary_key(&self) -> &[ColumnPath] {
        &self.primary_key
    }

    pub fn auto_generated_pk(&self) -> bool {
        self.auto_generated_pk
    }

    pub fn is_primary_key(&self, path: &ColumnPath) -> bool {
        self.primary_key.contains(path)
    }

    pub fn check_constraints(&self) -> &[CheckConstraint] {
        &self.check_constraints
    }

    pub fn partitioned_by(&self) -> &[ColumnPath] {
        &self.partitioned_by
    }

    pub fn is_partition_column(&self, path: &ColumnPath) -> bool {
        self.partitioned_by.contains(path)
    }

    pub fn clustered_by(&self) -> Option<&ColumnPath> {
        self.clustered_by.as_ref()
    }

    /// Policy of the table root
    pub fn column_policy(&self) -> ColumnPolicy {
        self.column_policy
    }

    /// Policy applied to unknown keys directly under `parent` (`None` = root)
    pub fn policy_under(&self, parent: Option<&ColumnPath>) -> ColumnPolicy {
        match parent {
            None => self.column_policy,
            Some(path) => self
                .columns
                .get(path)
                .map(|c| c.policy())
                .unwrap_or(ColumnPolicy::Dynamic),
        }
    }

    /// True if any ancestor of `path` is an array
    pub fn is_under_array(&self, path: &ColumnPath) -> bool {
        under_array(&self.columns, path)
    }

    /// Generated columns ordered so every column comes after the generated
    /// columns it references
    pub fn generated_evaluation_order(&self) -> Result<Vec<&ColumnDescriptor>> {
        let order = generated_order(&self.columns)?;
        Ok(order.iter().filter_map(|p| self.columns.get(p)).collect())
    }

    /// Columns with a default expression, in path order
    pub fn default_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.values().filter(|c| c.default_expression().is_some())
    }

    /// Columns that reject NULL (primary key columns included)
    pub fn not_null_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns
            .values()
            .filter(move |c| !c.is_nullable || self.primary_key.contains(&c.path))
    }

    /// Parse `source` and make sure every referenced column exists
    pub fn bind_expression(&self, source: &str) -> Result<BoundExpression> {
        bind_expression(&self.columns, source)
    }
}

impl ColumnResolver for TableSchema {
    fn resolve(&self, path: &ColumnPath) -> Option<&ColumnDescriptor> {
        self.columns.get(path)
    }

    fn children_of(&self, parent: &ColumnPath) -> Vec<&ColumnDescriptor> {
        self.children(parent)
    }
}

pub(crate) fn children_in<'a>(
    columns: &'a BTreeMap<ColumnPath, ColumnDescriptor>,
    parent: &ColumnPath,
) -> Vec<&'a ColumnDescriptor> {
    let mut children: Vec<_> = columns
        .range(parent.clone()..)
        .skip(1)
        .take_while(|(p, _)| p.is_descendant_of(parent))
        .filter(|(p, _)| p.depth() == parent.depth() + 1)
        .map(|(_, c)| c)
        .collect();
    children.sort_by_key(|c| c.position);
    children
}

pub(crate) fn under_array(columns: &BTreeMap<ColumnPath, ColumnDescriptor>, path: &ColumnPath) -> bool {
    path.ancestors()
        .iter()
        .any(|a| columns.get(a).map(|c| c.data_type.is_array()).unwrap_or(false))
}

/// Rebuild the inner-type records of `objects` and all of their ancestors
/// from their current children, deepest first.
pub(crate) fn refresh_object_types(
    columns: &mut BTreeMap<ColumnPath, ColumnDescriptor>,
    objects: impl IntoIterator<Item = ColumnPath>,
) {
    let mut pending = BTreeSet::new();
    for path in objects {
        for ancestor in path.ancestors() {
            pending.insert(ancestor);
        }
        pending.insert(path);
    }

    let mut ordered: Vec<ColumnPath> = pending.into_iter().collect();
    ordered.sort_by(|a, b| b.depth().cmp(&a.depth()));

    for path in ordered {
        let current = match columns.get(&path) {
            Some(c) if c.data_type.holds_objects() => c.data_type.clone(),
            _ => continue,
        };
        let record: ObjectType = children_in(columns, &path)
            .into_iter()
            .map(|c| (c.name().to_string(), c.data_type.clone()))
            .collect();
        if let Some(column) = columns.get_mut(&path) {
            column.data_type = current.with_object_type(record);
        }
    }
}

/// Synthesize child descriptors for object fields declared only through an
/// inner-type record, so every nested field is a column of its own.
pub(crate) fn expand_object_fields(columns: Vec<ColumnDescriptor>) -> Vec<ColumnDescriptor> {
    let mut declared: BTreeSet<ColumnPath> = columns.iter().map(|c| c.path.clone()).collect();
    let mut out = Vec::with_capacity(columns.len());
    let mut queue: std::collections::VecDeque<ColumnDescriptor> = columns.into();

    while let Some(column) = queue.pop_front() {
        if let Some(record) = column.data_type.object_type() {
            for (name, data_type) in record.fields() {
                let child_path = column.path.child(name);
                if declared.insert(child_path.clone()) {
                    queue.push_back(ColumnDescriptor::new(child_path, data_type.clone()));
                }
            }
        }
        out.push(column);
    }
    out
}

pub(crate) fn check_limits(
    table_id: &TableId,
    columns: &BTreeMap<ColumnPath, ColumnDescriptor>,
    limits: &SchemaLimits,
) -> Result<()> {
    if columns.len() > limits.max_columns {
        return Err(SchemaError::ColumnLimitExceeded {
            table: table_id.to_string(),
            limit: limits.max_columns,
            actual: columns.len(),
        });
    }
    if let Some(deepest) = columns.keys().find(|p| p.depth() > limits.max_depth) {
        return Err(SchemaError::DepthLimitExceeded {
            column: deepest.to_string(),
            limit: limits.max_depth,
            depth: deepest.depth(),
        });
    }
    Ok(())
}

pub(crate) fn bind_expression(
    columns: &BTreeMap<ColumnPath, ColumnDescriptor>,
    source: &str,
) -> Result<BoundExpression> {
    let expression = BoundExpression::parse(source)?;
    for referenced in expression.columns() {
        if !columns.contains_key(referenced) {
            return Err(SchemaError::column_unknown(referenced, referenced.parent().as_ref()));
        }
    }
    Ok(expression)
}

pub(crate) fn bind_check(
    columns: &BTreeMap<ColumnPath, ColumnDescriptor>,
    existing: &[CheckConstraint],
    def: &CheckConstraintDef,
) -> Result<CheckConstraint> {
    if def.name.trim().is_empty() {
        return Err(SchemaError::InvalidSchema(
            "Check constraint name must not be empty".to_string(),
        ));
    }
    if existing.iter().any(|c| c.name == def.name) {
        return Err(SchemaError::InvalidSchema(format!(
            "Check constraint '{}' already exists",
            def.name
        )));
    }
    Ok(CheckConstraint {
        name: def.name.clone(),
        expression: bind_expression(columns, &def.expression)?,
    })
}

/// Validate default and generated expressions of every column
pub(crate) fn validate_column_expressions(columns: &BTreeMap<ColumnPath, ColumnDescriptor>) -> Result<()> {
    for column in columns.values() {
        if let Some(default) = column.default_expression() {
            if !default.columns().is_empty() {
                return Err(SchemaError::InvalidExpression {
                    expression: default.source().to_string(),
                    reason: format!("default of column `{}` cannot reference columns", column.path),
                });
            }
        }
        if let Some(generated) = column.generated_expression() {
            for referenced in generated.columns() {
                if referenced.is_within(&column.path) || column.path.is_descendant_of(referenced) {
                    return Err(SchemaError::InvalidExpression {
                        expression: generated.source().to_string(),
                        reason: format!("generated column `{}` cannot reference itself", column.path),
                    });
                }
                if !columns.contains_key(referenced) {
                    return Err(SchemaError::column_unknown(referenced, referenced.parent().as_ref()));
                }
            }
        }
    }
    generated_order(columns).map(|_| ())
}

/// Topological order of generated columns. Ties resolve by (depth, position)
/// so the order is deterministic.
pub(crate) fn generated_order(columns: &BTreeMap<ColumnPath, ColumnDescriptor>) -> Result<Vec<ColumnPath>> {
    let mut generated: Vec<&ColumnDescriptor> = columns.values().filter(|c| c.is_generated()).collect();
    generated.sort_by_key(|c| (c.path.depth(), c.position));

    let mut pending: HashMap<&ColumnPath, Vec<&ColumnPath>> = HashMap::new();
    for column in &generated {
        let deps = column
            .generated_expression()
            .map(|e| {
                e.columns()
                    .iter()
                    .filter(|r| columns.get(*r).map(|c| c.is_generated()).unwrap_or(false))
                    .collect()
            })
            .unwrap_or_default();
        pending.insert(&column.path, deps);
    }

    let mut order: Vec<ColumnPath> = Vec::with_capacity(generated.len());
    while order.len() < generated.len() {
        let next = generated.iter().find(|c| {
            !order.contains(&c.path)
                && pending
                    .get(&c.path)
                    .map(|deps| deps.iter().all(|d| order.contains(*d)))
                    .unwrap_or(true)
        });
        match next {
            Some(column) => order.push(column.path.clone()),
            None => {
                let cycle: Vec<String> = generated
                    .iter()
                    .filter(|c| !order.contains(&c.path))
                    .map(|c| c.path.to_string())
                    .collect();
                return Err(SchemaError::InvalidSchema(format!(
                    "Cyclic references between generated columns: {}",
                    cycle.join(", ")
                )));
            }
        }
    }
    Ok(order)
}

/// Builder for the first version of a table schema
#[derive(Debug, Clone)]
pub struct TableSchemaBuilder {
    table_id: TableId,
    columns: Vec<ColumnDescriptor>,
    primary_key: Vec<ColumnPath>,
    check_constraints: Vec<CheckConstraintDef>,
    index_columns: Vec<IndexColumn>,
    partitioned_by: Vec<ColumnPath>,
    clustered_by: Option<ColumnPath>,
    column_policy: ColumnPolicy,
}

impl TableSchemaBuilder {
    pub fn new(table_id: TableId) -> Self {
        Self {
            table_id,
            columns: Vec::new(),
            primary_key: Vec::new(),
            check_constraints: Vec::new(),
            index_columns: Vec::new(),
            partitioned_by: Vec::new(),
            clustered_by: None,
            column_policy: ColumnPolicy::Strict,
        }
    }

    pub fn table_id(&self) -> &TableId {
        &self.table_id
    }

    pub fn column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, path: ColumnPath) -> Self {
        self.primary_key.push(path);
        self
    }

    pub fn check(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.check_constraints.push(CheckConstraintDef::new(name, expression));
        self
    }

    pub fn index_column(mut self, index: IndexColumn) -> Self {
        self.index_columns.push(index);
        self
    }

    pub fn partitioned_by(mut self, path: ColumnPath) -> Self {
        self.partitioned_by.push(path);
        self
    }

    pub fn clustered_by(mut self, path: ColumnPath) -> Self {
        self.clustered_by = Some(path);
        self
    }

    pub fn column_policy(mut self, policy: ColumnPolicy) -> Self {
        self.column_policy = policy;
        self
    }

    /// Validate the definition and assign ids and positions.
    pub fn build(
        self,
        allocator: &mut dyn ColumnIdAllocator,
        limits: &SchemaLimits,
    ) -> Result<TableSchema> {
        let mut proposed = expand_object_fields(self.columns);
        // Parents first, declaration order within a level
        proposed.sort_by_key(|c| c.path.depth());

        let mut columns: BTreeMap<ColumnPath, ColumnDescriptor> = BTreeMap::new();
        for mut column in proposed {
            for (idx, segment) in column.path.segments().iter().enumerate() {
                SystemColumns::validate_name(segment, idx == 0)?;
            }
            if let Some(parent) = column.path.parent() {
                match columns.get(&parent) {
                    Some(p) if p.data_type.holds_objects() => {}
                    Some(_) => {
                        return Err(SchemaError::InvalidSchema(format!(
                            "Column `{}` cannot have children: it is not an object",
                            parent
                        )))
                    }
                    None => {
                        return Err(SchemaError::InvalidSchema(format!(
                            "Cannot add column `{}` because its parent `{}` does not exist",
                            column.path, parent
                        )))
                    }
                }
            }
            if columns.contains_key(&column.path) {
                return Err(SchemaError::InvalidSchema(format!(
                    "Column `{}` is defined more than once",
                    column.path
                )));
            }

            if !column.column_id.is_assigned() {
                column.column_id = allocator.next_column_id();
            }
            if column.position <= 0 {
                column.position = allocator.next_position();
            }
            column.since_version = 1;
            column.dropped = false;
            if column.data_type.holds_objects() && column.column_policy.is_none() {
                column.column_policy = Some(ColumnPolicy::Dynamic);
            }
            columns.insert(column.path.clone(), column);
        }

        check_limits(&self.table_id, &columns, limits)?;

        for path in &self.primary_key {
            let column = columns.get_mut(path).ok_or_else(|| {
                SchemaError::InvalidSchema(format!("Primary key column `{}` does not exist", path))
            })?;
            if column.data_type.is_array() || column.data_type.is_object() {
                return Err(SchemaError::InvalidSchema(format!(
                    "Column `{}` of type {} cannot be part of the primary key",
                    path, column.data_type
                )));
            }
            column.is_nullable = false;
        }
        for path in self.partitioned_by.iter().chain(self.clustered_by.iter()) {
            match columns.get(path) {
                Some(c) if !c.data_type.is_array() && !c.data_type.is_object() => {}
                Some(c) => {
                    return Err(SchemaError::InvalidSchema(format!(
                        "Column `{}` of type {} cannot be used for partitioning or routing",
                        path, c.data_type
                    )))
                }
                None => {
                    return Err(SchemaError::InvalidSchema(format!(
                        "Column `{}` used for partitioning or routing does not exist",
                        path
                    )))
                }
            }
            if !self.primary_key.is_empty() && !self.primary_key.contains(path) {
                return Err(SchemaError::InvalidSchema(format!(
                    "Column `{}` must be part of the primary key",
                    path
                )));
            }
        }
        for path in self.primary_key.iter().chain(self.partitioned_by.iter()) {
            if under_array(&columns, path) {
                return Err(SchemaError::InvalidSchema(format!(
                    "Column `{}` is nested in an array and cannot be a key column",
                    path
                )));
            }
        }

        let object_paths: Vec<ColumnPath> = columns
            .values()
            .filter(|c| c.data_type.holds_objects())
            .map(|c| c.path.clone())
            .collect();
        refresh_object_types(&mut columns, object_paths);

        validate_column_expressions(&columns)?;

        let mut check_constraints: Vec<CheckConstraint> = Vec::new();
        for def in &self.check_constraints {
            let check = bind_check(&columns, &check_constraints, def)?;
            check_constraints.push(check);
        }

        let mut index_columns: Vec<IndexColumn> = Vec::new();
        for mut index in self.index_columns {
            SystemColumns::validate_name(&index.name, true)?;
            let path = ColumnPath::root(index.name.as_str());
            if columns.contains_key(&path) || index_columns.iter().any(|i| i.name == index.name) {
                return Err(SchemaError::InvalidSchema(format!(
                    "Index column '{}' collides with an existing column",
                    index.name
                )));
            }
            for source in &index.sources {
                match columns.get(source) {
                    Some(c) if matches!(c.data_type.innermost(), DataType::Text) => {}
                    Some(c) => {
                        return Err(SchemaError::InvalidSchema(format!(
                            "Index column '{}' source `{}` must be of type TEXT, not {}",
                            index.name, source, c.data_type
                        )))
                    }
                    None => return Err(SchemaError::column_unknown(source, source.parent().as_ref())),
                }
            }
            if !index.column_id.is_assigned() {
                index.column_id = allocator.next_column_id();
            }
            index_columns.push(index);
        }

        let (primary_key, auto_generated_pk) = if self.primary_key.is_empty()
            && self.partitioned_by.is_empty()
            && self.clustered_by.is_none()
        {
            (vec![ColumnPath::root(SystemColumns::ID)], true)
        } else {
            (self.primary_key, false)
        };

        log::debug!(
            "Built schema for table {} with {} columns (pk: {:?})",
            self.table_id,
            columns.len(),
            primary_key
        );

        Ok(TableSchema {
            table_id: self.table_id,
            columns,
            dropped_columns: Vec::new(),
            index_columns,
            primary_key,
            auto_generated_pk,
            check_constraints,
            partitioned_by: self.partitioned_by,
            clustered_by: self.clustered_by,
            column_policy: self.column_policy,
            version: 1,
        })
    }
}
