//! Column descriptor
//!
//! Describes one column (top-level or nested) of a table schema. A descriptor
//! proposed by a writer carries `ColumnId::UNASSIGNED` and a negative
//! (staged) position until the metadata coordinator commits it.

use serde::{Deserialize, Serialize};

use crate::column_path::ColumnPath;
use crate::column_policy::ColumnPolicy;
use crate::datatypes::DataType;
use crate::error::Result;
use crate::expression::BoundExpression;
use crate::ids::ColumnId;

/// Plain column, column with a default, or generated column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnKind {
    Plain,
    /// Value applied when the row leaves the column absent
    Default { expression: BoundExpression },
    /// Value always computed from other columns of the same row
    Generated { expression: BoundExpression },
}

/// Whether the column produces search fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexMode {
    Plain,
    Off,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub column_id: ColumnId,
    pub path: ColumnPath,
    /// 1-based ordinal; negative while staged (uncommitted)
    pub position: i32,
    pub data_type: DataType,
    pub is_nullable: bool,
    /// Only meaningful for objects and object arrays
    pub column_policy: Option<ColumnPolicy>,
    pub kind: ColumnKind,
    pub index_mode: IndexMode,
    /// Schema version that introduced the column
    pub since_version: u64,
    pub dropped: bool,
}

impl ColumnDescriptor {
    /// Nullable plain column proposal. Objects start out DYNAMIC.
    pub fn new(path: ColumnPath, data_type: DataType) -> Self {
        let column_policy = if data_type.holds_objects() {
            Some(ColumnPolicy::Dynamic)
        } else {
            None
        };
        Self {
            column_id: ColumnId::UNASSIGNED,
            path,
            position: 0,
            data_type,
            is_nullable: true,
            column_policy,
            kind: ColumnKind::Plain,
            index_mode: IndexMode::Plain,
            since_version: 0,
            dropped: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn with_policy(mut self, policy: ColumnPolicy) -> Self {
        self.column_policy = Some(policy);
        self
    }

    pub fn with_default(mut self, expression: &str) -> Result<Self> {
        self.kind = ColumnKind::Default {
            expression: BoundExpression::parse(expression)?,
        };
        Ok(self)
    }

    pub fn generated(mut self, expression: &str) -> Result<Self> {
        self.kind = ColumnKind::Generated {
            expression: BoundExpression::parse(expression)?,
        };
        Ok(self)
    }

    pub fn index_off(mut self) -> Self {
        self.index_mode = IndexMode::Off;
        self
    }

    pub fn with_id(mut self, column_id: ColumnId) -> Self {
        self.column_id = column_id;
        self
    }

    pub fn with_position(mut self, position: i32) -> Self {
        self.position = position;
        self
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    pub fn is_staged(&self) -> bool {
        self.position < 0
    }

    pub fn is_object(&self) -> bool {
        self.data_type.holds_objects()
    }

    pub fn is_generated(&self) -> bool {
        matches!(self.kind, ColumnKind::Generated { .. })
    }

    pub fn generated_expression(&self) -> Option<&BoundExpression> {
        match &self.kind {
            ColumnKind::Generated { expression } => Some(expression),
            _ => None,
        }
    }

    pub fn default_expression(&self) -> Option<&BoundExpression> {
        match &self.kind {
            ColumnKind::Default { expression } => Some(expression),
            _ => None,
        }
    }

    /// Effective policy for keys below this object
    pub fn policy(&self) -> ColumnPolicy {
        self.column_policy.unwrap_or(ColumnPolicy::Dynamic)
    }

    pub fn storage_key(&self) -> String {
        self.column_id.storage_key()
    }

    /// Column clause as it would appear in CREATE TABLE
    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.path.sql_fqn(), self.data_type.sql_name());
        if !self.is_nullable {
            sql.push_str(" NOT NULL");
        }
        match &self.kind {
            ColumnKind::Plain => {}
            ColumnKind::Default { expression } => {
                sql.push_str(&format!(" DEFAULT {}", expression));
            }
            ColumnKind::Generated { expression } => {
                sql.push_str(&format!(" GENERATED ALWAYS AS ({})", expression));
            }
        }
        if let Some(policy) = self.column_policy {
            sql.push_str(&format!(" WITH (column_policy = '{}')", policy.as_str().to_lowercase()));
        }
        if self.index_mode == IndexMode::Off {
            sql.push_str(" INDEX OFF");
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::ObjectType;

    #[test]
    fn test_new_object_columns_are_dynamic() {
        let obj = ColumnDescriptor::new(ColumnPath::root("o"), DataType::Object(ObjectType::new()));
        assert_eq!(obj.column_policy, Some(ColumnPolicy::Dynamic));
        let scalar = ColumnDescriptor::new(ColumnPath::root("x"), DataType::Int);
        assert_eq!(scalar.column_policy, None);
        assert!(!scalar.column_id.is_assigned());
    }

    #[test]
    fn test_to_sql() {
        let col = ColumnDescriptor::new(ColumnPath::new("o", ["total"]), DataType::BigInt)
            .not_null()
            .generated("o.a + o.b")
            .unwrap();
        assert_eq!(
            col.to_sql(),
            "o['total'] BIGINT NOT NULL GENERATED ALWAYS AS (o.a + o.b)"
        );
        assert!(col.is_generated());
        assert!(col.default_expression().is_none());
    }

    #[test]
    fn test_invalid_default_is_rejected() {
        let result = ColumnDescriptor::new(ColumnPath::root("x"), DataType::Int).with_default("1 +");
        assert!(result.is_err());
    }
}
