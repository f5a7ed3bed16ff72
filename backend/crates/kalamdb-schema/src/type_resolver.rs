//! Type inference from observed values and widening of existing columns

use serde_json::Value;

use crate::column_path::ColumnPath;
use crate::datatypes::{DataType, ObjectType};
use crate::error::{Result, SchemaError};

/// Outcome of reconciling an observed type with a column's declared type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Widening {
    Unchanged,
    Widened(DataType),
}

pub struct TypeResolver;

impl TypeResolver {
    /// Storage type for an observed value, `None` for null.
    ///
    /// Integers map to BIGINT, fractional numbers to DOUBLE, arrays that are
    /// empty or contain only nulls to `ARRAY(UNDEFINED)`. Objects map to an
    /// object with an empty record; their children are discovered separately.
    pub fn infer(column: &ColumnPath, value: &Value) -> Result<Option<DataType>> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(_) => Ok(Some(DataType::Boolean)),
            Value::Number(n) => {
                if n.is_i64() {
                    Ok(Some(DataType::BigInt))
                } else {
                    Ok(Some(DataType::Double))
                }
            }
            Value::String(_) => Ok(Some(DataType::Text)),
            Value::Object(_) => Ok(Some(DataType::Object(ObjectType::new()))),
            Value::Array(items) => {
                let mut element = DataType::Undefined;
                for item in items {
                    if let Some(item_type) = Self::infer(column, item)? {
                        element = Self::merge_elements(column, &element, &item_type)?;
                    }
                }
                Ok(Some(DataType::array_of(element)))
            }
        }
    }

    /// Common element type of two array elements
    pub fn merge_elements(column: &ColumnPath, a: &DataType, b: &DataType) -> Result<DataType> {
        match (a, b) {
            _ if a == b => Ok(a.clone()),
            (DataType::Undefined, other) | (other, DataType::Undefined) => Ok(other.clone()),
            (DataType::BigInt, DataType::Double) | (DataType::Double, DataType::BigInt) => {
                Ok(DataType::Double)
            }
            (DataType::Object(_), DataType::Object(_)) => Ok(DataType::Object(ObjectType::new())),
            (DataType::Array(x), DataType::Array(y)) => {
                Ok(DataType::array_of(Self::merge_elements(column, x, y)?))
            }
            _ => Err(SchemaError::InvalidSchema(format!(
                "Mixed types in array column `{}`: {} and {}",
                column, a, b
            ))),
        }
    }

    /// Reconcile an observed (or proposed) type with an existing column type.
    ///
    /// An array whose element type is still undefined adopts the first
    /// concrete element type; a proposal carrying less information than the
    /// existing type is a no-op; objects are reconciled child by child
    /// elsewhere. Everything else is a type conflict.
    pub fn widen(column: &ColumnPath, existing: &DataType, proposed: &DataType) -> Result<Widening> {
        match (existing, proposed) {
            _ if existing == proposed => Ok(Widening::Unchanged),
            (_, DataType::Undefined) => Ok(Widening::Unchanged),
            (DataType::Undefined, concrete) => Ok(Widening::Widened(concrete.clone())),
            (DataType::Object(_), DataType::Object(_)) => Ok(Widening::Unchanged),
            (DataType::Array(x), DataType::Array(y)) => match Self::widen(column, x, y) {
                Ok(Widening::Unchanged) => Ok(Widening::Unchanged),
                Ok(Widening::Widened(inner)) => Ok(Widening::Widened(DataType::array_of(inner))),
                Err(_) => Err(Self::conflict(column, existing, proposed)),
            },
            _ => Err(Self::conflict(column, existing, proposed)),
        }
    }

    fn conflict(column: &ColumnPath, existing: &DataType, proposed: &DataType) -> SchemaError {
        SchemaError::TypeConflict {
            column: column.to_string(),
            existing: existing.sql_name(),
            proposed: proposed.sql_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path() -> ColumnPath {
        ColumnPath::root("c")
    }

    #[test]
    fn test_infer_scalars() {
        assert_eq!(TypeResolver::infer(&path(), &json!(null)).unwrap(), None);
        assert_eq!(TypeResolver::infer(&path(), &json!(1)).unwrap(), Some(DataType::BigInt));
        assert_eq!(TypeResolver::infer(&path(), &json!(1.5)).unwrap(), Some(DataType::Double));
        assert_eq!(TypeResolver::infer(&path(), &json!("x")).unwrap(), Some(DataType::Text));
        assert_eq!(TypeResolver::infer(&path(), &json!(true)).unwrap(), Some(DataType::Boolean));
    }

    #[test]
    fn test_infer_arrays() {
        assert_eq!(
            TypeResolver::infer(&path(), &json!([])).unwrap(),
            Some(DataType::array_of(DataType::Undefined))
        );
        assert_eq!(
            TypeResolver::infer(&path(), &json!([null, 1, 2.5])).unwrap(),
            Some(DataType::array_of(DataType::Double))
        );
        assert_eq!(
            TypeResolver::infer(&path(), &json!([[1], []])).unwrap(),
            Some(DataType::array_of(DataType::array_of(DataType::BigInt)))
        );
        assert!(TypeResolver::infer(&path(), &json!([1, "a"])).is_err());
    }

    #[test]
    fn test_widen_undefined_array() {
        let undefined = DataType::array_of(DataType::Undefined);
        let ints = DataType::array_of(DataType::BigInt);
        assert_eq!(
            TypeResolver::widen(&path(), &undefined, &ints).unwrap(),
            Widening::Widened(ints.clone())
        );
        assert_eq!(TypeResolver::widen(&path(), &ints, &undefined).unwrap(), Widening::Unchanged);
    }

    #[test]
    fn test_widen_conflict() {
        let err = TypeResolver::widen(&path(), &DataType::Text, &DataType::BigInt).unwrap_err();
        assert!(matches!(err, SchemaError::TypeConflict { .. }));
        let err = TypeResolver::widen(
            &path(),
            &DataType::array_of(DataType::Text),
            &DataType::array_of(DataType::BigInt),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Column `c` cannot change type from ARRAY(TEXT) to ARRAY(BIGINT)"
        );
    }
}
