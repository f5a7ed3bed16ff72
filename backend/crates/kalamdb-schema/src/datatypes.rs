//! Column data types
//!
//! Scalars carry a one-byte wire tag (stable across releases). Objects carry
//! an ordered inner-type record listing their children; arrays wrap an element
//! type and may nest.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Element type of an array observed only empty or null
    Undefined,
    Boolean,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Text,
    /// Milliseconds since the Unix epoch
    Timestamp,
    Object(ObjectType),
    Array(Box<DataType>),
}

/// Inner-type record of an object column, children in position order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ObjectType {
    fields: Vec<(String, DataType)>,
}

impl ObjectType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.set_field(name, data_type);
        self
    }

    pub fn field(&self, name: &str) -> Option<&DataType> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Replaces an existing field in place or appends a new one
    pub fn set_field(&mut self, name: impl Into<String>, data_type: DataType) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = data_type,
            None => self.fields.push((name, data_type)),
        }
    }

    pub fn remove_field(&mut self, name: &str) -> Option<DataType> {
        let idx = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(idx).1)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &DataType)> {
        self.fields.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, DataType)> for ObjectType {
    fn from_iter<I: IntoIterator<Item = (String, DataType)>>(iter: I) -> Self {
        let mut object = ObjectType::new();
        for (name, data_type) in iter {
            object.set_field(name, data_type);
        }
        object
    }
}

impl DataType {
    /// Wire tag, nested types use the tag of their outer constructor
    pub fn tag(&self) -> u8 {
        match self {
            DataType::Undefined => 0x00,
            DataType::Boolean => 0x01,
            DataType::SmallInt => 0x02,
            DataType::Int => 0x03,
            DataType::BigInt => 0x04,
            DataType::Float => 0x05,
            DataType::Double => 0x06,
            DataType::Text => 0x07,
            DataType::Timestamp => 0x08,
            DataType::Object(_) => 0x10,
            DataType::Array(_) => 0x11,
        }
    }

    /// Scalar type for a wire tag
    pub fn scalar_from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(DataType::Undefined),
            0x01 => Some(DataType::Boolean),
            0x02 => Some(DataType::SmallInt),
            0x03 => Some(DataType::Int),
            0x04 => Some(DataType::BigInt),
            0x05 => Some(DataType::Float),
            0x06 => Some(DataType::Double),
            0x07 => Some(DataType::Text),
            0x08 => Some(DataType::Timestamp),
            _ => None,
        }
    }

    pub fn sql_name(&self) -> String {
        match self {
            DataType::Undefined => "UNDEFINED".to_string(),
            DataType::Boolean => "BOOLEAN".to_string(),
            DataType::SmallInt => "SMALLINT".to_string(),
            DataType::Int => "INT".to_string(),
            DataType::BigInt => "BIGINT".to_string(),
            DataType::Float => "FLOAT".to_string(),
            DataType::Double => "DOUBLE".to_string(),
            DataType::Text => "TEXT".to_string(),
            DataType::Timestamp => "TIMESTAMP".to_string(),
            DataType::Object(_) => "OBJECT".to_string(),
            DataType::Array(inner) => format!("ARRAY({})", inner.sql_name()),
        }
    }

    pub fn array_of(element: DataType) -> Self {
        DataType::Array(Box::new(element))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, DataType::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, DataType::Object(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::SmallInt | DataType::Int | DataType::BigInt | DataType::Float | DataType::Double
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, DataType::SmallInt | DataType::Int | DataType::BigInt)
    }

    /// Number of array dimensions wrapping the innermost type
    pub fn array_dimensions(&self) -> usize {
        match self {
            DataType::Array(inner) => 1 + inner.array_dimensions(),
            _ => 0,
        }
    }

    pub fn element_type(&self) -> Option<&DataType> {
        match self {
            DataType::Array(inner) => Some(inner),
            _ => None,
        }
    }

    /// Type below all array dimensions
    pub fn innermost(&self) -> &DataType {
        match self {
            DataType::Array(inner) => inner.innermost(),
            other => other,
        }
    }

    /// Object record of an object column or an (n-dimensional) object array
    pub fn object_type(&self) -> Option<&ObjectType> {
        match self.innermost() {
            DataType::Object(object) => Some(object),
            _ => None,
        }
    }

    /// True for objects and object arrays, the types that may own child columns
    pub fn holds_objects(&self) -> bool {
        self.object_type().is_some()
    }

    /// Keeps the array dimensions and swaps the innermost object record
    pub fn with_object_type(&self, object: ObjectType) -> DataType {
        match self {
            DataType::Array(inner) => DataType::Array(Box::new(inner.with_object_type(object))),
            DataType::Object(_) => DataType::Object(object),
            other => other.clone(),
        }
    }

    pub fn contains_undefined(&self) -> bool {
        matches!(self.innermost(), DataType::Undefined)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_names() {
        assert_eq!(DataType::BigInt.sql_name(), "BIGINT");
        assert_eq!(
            DataType::array_of(DataType::array_of(DataType::Text)).sql_name(),
            "ARRAY(ARRAY(TEXT))"
        );
        assert_eq!(DataType::Object(ObjectType::new()).to_string(), "OBJECT");
    }

    #[test]
    fn test_scalar_tags_round_trip() {
        for ty in [
            DataType::Undefined,
            DataType::Boolean,
            DataType::SmallInt,
            DataType::Int,
            DataType::BigInt,
            DataType::Float,
            DataType::Double,
            DataType::Text,
            DataType::Timestamp,
        ] {
            assert_eq!(DataType::scalar_from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(DataType::scalar_from_tag(0x10), None);
    }

    #[test]
    fn test_object_type_keeps_field_order() {
        let mut object = ObjectType::new()
            .with_field("b", DataType::Int)
            .with_field("a", DataType::Text);
        object.set_field("b", DataType::BigInt);
        let names: Vec<&str> = object.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(object.field("b"), Some(&DataType::BigInt));
        assert_eq!(object.remove_field("a"), Some(DataType::Text));
        assert_eq!(object.len(), 1);
    }

    #[test]
    fn test_with_object_type_keeps_dimensions() {
        let array = DataType::array_of(DataType::Object(ObjectType::new()));
        let record = ObjectType::new().with_field("x", DataType::Int);
        let updated = array.with_object_type(record.clone());
        assert_eq!(updated.array_dimensions(), 1);
        assert_eq!(updated.object_type(), Some(&record));
        assert!(updated.holds_objects());
        assert!(!DataType::array_of(DataType::Int).holds_objects());
    }
}
