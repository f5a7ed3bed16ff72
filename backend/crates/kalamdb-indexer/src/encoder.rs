//! Value coercion and storage document encoding

use chrono::DateTime;
use serde_json::{Map, Value};

use kalamdb_schema::{ColumnDescriptor, ColumnPath, ColumnPolicy, DataType, SchemaError, SystemColumns, TableSchema};

use crate::error::{Result, RowRejection};
use crate::row::RowTree;
use crate::settings::{AccessMode, IndexerOptions};
use crate::storage_form::{unresolved_key, StorageDocument, StoredValue, UntypedKeys};

/// Output of encoding one row tree
#[derive(Debug, Default)]
pub(crate) struct EncodedRow {
    pub storage: StorageDocument,
    pub partition_values: Vec<(ColumnPath, Value)>,
    /// Paths whose values were stored without a committed column
    pub pending_columns: Vec<ColumnPath>,
}

pub(crate) struct DocumentEncoder<'a> {
    schema: &'a TableSchema,
    options: &'a IndexerOptions,
}

impl<'a> DocumentEncoder<'a> {
    pub fn new(schema: &'a TableSchema, options: &'a IndexerOptions) -> Self {
        Self { schema, options }
    }

    pub fn encode(&self, tree: &RowTree) -> Result<EncodedRow> {
        let mut row = EncodedRow::default();
        let entries = self.encode_object(None, tree, &mut row)?;
        row.storage = StorageDocument::new(entries);
        Ok(row)
    }

    fn encode_object(
        &self,
        parent: Option<&ColumnPath>,
        object: &Map<String, Value>,
        row: &mut EncodedRow,
    ) -> Result<Vec<(String, StoredValue)>> {
        let known = match parent {
            None => self.schema.root_columns(),
            Some(path) => self.schema.children(path),
        };

        // Committed children first, in position order
        let mut entries = Vec::with_capacity(object.len());
        for column in known {
            let Some(value) = object.get(column.name()) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if parent.is_none() && self.schema.is_partition_column(&column.path) {
                row.partition_values.push((column.path.clone(), value.clone()));
                continue;
            }
            entries.push((column.storage_key(), self.encode_value(column, value, row)?));
        }

        let policy = self.schema.policy_under(parent);
        for (key, value) in object {
            if value.is_null() {
                continue;
            }
            let path = match parent {
                Some(p) => p.child(key.as_str()),
                None => ColumnPath::root(key.as_str()),
            };
            if self.schema.column(&path).is_some() {
                continue;
            }
            if parent.is_none() && SystemColumns::is_reserved(key) {
                log::trace!("Skipping reserved key `{}`", key);
                continue;
            }
            match policy {
                ColumnPolicy::Strict => {
                    if self.options.rejects_unknown() {
                        return Err(SchemaError::column_unknown(&path, parent).into());
                    }
                }
                ColumnPolicy::Dynamic if self.options.access_mode == AccessMode::Read => {
                    if self.options.rejects_unknown() {
                        return Err(SchemaError::column_unknown(&path, parent).into());
                    }
                }
                ColumnPolicy::Dynamic => {
                    entries.push((unresolved_key(key), StoredValue::untyped(value, UntypedKeys::Unresolved)));
                    row.pending_columns.push(path);
                }
                ColumnPolicy::Ignored => {
                    // Never committed, so never pending
                    entries.push((unresolved_key(key), StoredValue::untyped(value, UntypedKeys::Unresolved)));
                }
            }
        }
        Ok(entries)
    }

    fn encode_value(&self, column: &ColumnDescriptor, value: &Value, row: &mut EncodedRow) -> Result<StoredValue> {
        match &column.data_type {
            DataType::Object(_) => match value {
                Value::Object(map) => Ok(StoredValue::Object(self.encode_object(Some(&column.path), map, row)?)),
                other => Err(invalid_value(&column.path, other, &column.data_type, "expected an object")),
            },
            DataType::Array(element) => match value {
                Value::Array(items) => Ok(StoredValue::Array(
                    items
                        .iter()
                        .map(|item| self.encode_element(column, element, item, row))
                        .collect::<Result<_>>()?,
                )),
                other => Err(invalid_value(&column.path, other, &column.data_type, "expected an array")),
            },
            scalar => coerce_scalar(&column.path, scalar, value),
        }
    }

    fn encode_element(
        &self,
        column: &ColumnDescriptor,
        element: &DataType,
        item: &Value,
        row: &mut EncodedRow,
    ) -> Result<StoredValue> {
        if item.is_null() {
            return Ok(StoredValue::Null);
        }
        match element {
            DataType::Array(inner) => match item {
                Value::Array(items) => Ok(StoredValue::Array(
                    items
                        .iter()
                        .map(|i| self.encode_element(column, inner, i, row))
                        .collect::<Result<_>>()?,
                )),
                other => Err(invalid_value(&column.path, other, element, "expected a nested array")),
            },
            DataType::Object(_) => match item {
                Value::Object(map) => Ok(StoredValue::Object(self.encode_object(Some(&column.path), map, row)?)),
                other => Err(invalid_value(&column.path, other, element, "expected an object")),
            },
            DataType::Undefined => {
                // Element type is only known once the widening is committed
                if !row.pending_columns.contains(&column.path) {
                    row.pending_columns.push(column.path.clone());
                }
                Ok(StoredValue::untyped(item, UntypedKeys::Unresolved))
            }
            scalar => coerce_scalar(&column.path, scalar, item),
        }
    }
}

/// Coerce a non-null JSON value to a scalar column type.
///
/// Numbers and numeric strings are accepted for numeric columns, integers and
/// RFC 3339 strings for timestamps (stored as epoch milliseconds). Anything
/// that cannot be represented exactly is rejected.
pub fn coerce_scalar(column: &ColumnPath, data_type: &DataType, value: &Value) -> Result<StoredValue> {
    match data_type {
        DataType::Boolean => match value {
            Value::Bool(b) => Ok(StoredValue::Bool(*b)),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(StoredValue::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(StoredValue::Bool(false)),
            other => Err(invalid_value(column, other, data_type, "not a boolean")),
        },
        DataType::SmallInt => coerce_integer(column, data_type, value, i16::MIN as i64, i16::MAX as i64),
        DataType::Int => coerce_integer(column, data_type, value, i32::MIN as i64, i32::MAX as i64),
        DataType::BigInt => coerce_integer(column, data_type, value, i64::MIN, i64::MAX),
        DataType::Float => {
            let f = coerce_float(column, data_type, value)?;
            if f.abs() > f32::MAX as f64 {
                return Err(overflow(column, value, data_type));
            }
            Ok(StoredValue::Float(f as f32 as f64))
        }
        DataType::Double => Ok(StoredValue::Float(coerce_float(column, data_type, value)?)),
        DataType::Text => match value {
            Value::String(s) => Ok(StoredValue::Text(s.clone())),
            Value::Number(n) => Ok(StoredValue::Text(n.to_string())),
            Value::Bool(b) => Ok(StoredValue::Text(b.to_string())),
            other => Err(invalid_value(column, other, data_type, "not a text value")),
        },
        DataType::Timestamp => match value {
            Value::String(s) => match DateTime::parse_from_rfc3339(s) {
                Ok(ts) => Ok(StoredValue::Int(ts.timestamp_millis())),
                Err(e) => match s.trim().parse::<i64>() {
                    Ok(millis) => Ok(StoredValue::Int(millis)),
                    Err(_) => Err(invalid_value(column, value, data_type, &e.to_string())),
                },
            },
            other => coerce_integer(column, data_type, other, i64::MIN, i64::MAX),
        },
        DataType::Undefined => Ok(StoredValue::untyped(value, UntypedKeys::Unresolved)),
        DataType::Object(_) | DataType::Array(_) => {
            Err(invalid_value(column, value, data_type, "not a scalar type"))
        }
    }
}

fn coerce_integer(column: &ColumnPath, data_type: &DataType, value: &Value, min: i64, max: i64) -> Result<StoredValue> {
    let parsed = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else if n.is_u64() {
                return Err(overflow(column, value, data_type));
            } else {
                integral_float(column, data_type, value, n.as_f64().unwrap_or(f64::NAN))?
            }
        }
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(i) => i,
            Err(_) => match s.trim().parse::<f64>() {
                Ok(f) => integral_float(column, data_type, value, f)?,
                Err(_) => return Err(invalid_value(column, value, data_type, "not a number")),
            },
        },
        other => return Err(invalid_value(column, other, data_type, "not a number")),
    };
    if parsed < min || parsed > max {
        return Err(overflow(column, value, data_type));
    }
    Ok(StoredValue::Int(parsed))
}

fn integral_float(column: &ColumnPath, data_type: &DataType, value: &Value, f: f64) -> Result<i64> {
    if !f.is_finite() || f.fract() != 0.0 {
        return Err(invalid_value(column, value, data_type, "not an integral number"));
    }
    if f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(overflow(column, value, data_type));
    }
    Ok(f as i64)
}

/// Stored floats are always finite: NaN and infinities have no JSON form.
fn coerce_float(column: &ColumnPath, data_type: &DataType, value: &Value) -> Result<f64> {
    let f = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| invalid_value(column, value, data_type, "not a number"))?,
        Value::String(s) => {
            let text = s.trim();
            let f = text
                .parse::<f64>()
                .map_err(|_| invalid_value(column, value, data_type, "not a number"))?;
            if f.is_nan() || (f.is_infinite() && text.to_ascii_lowercase().contains("inf")) {
                return Err(invalid_value(column, value, data_type, "not a finite number"));
            }
            f
        }
        other => return Err(invalid_value(column, other, data_type, "not a number")),
    };
    if !f.is_finite() {
        return Err(overflow(column, value, data_type));
    }
    Ok(f)
}

fn overflow(column: &ColumnPath, value: &Value, data_type: &DataType) -> crate::error::IndexerError {
    RowRejection::Overflow {
        column: column.to_string(),
        value: value.to_string(),
        data_type: data_type.to_string(),
    }
    .into()
}

fn invalid_value(column: &ColumnPath, value: &Value, data_type: &DataType, reason: &str) -> crate::error::IndexerError {
    RowRejection::InvalidValue {
        column: column.to_string(),
        value: value.to_string(),
        data_type: data_type.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
