//! Row trees: target-aligned values folded into one nested JSON object

use kalamdb_schema::ColumnPath;
use serde_json::{Map, Value};

use crate::error::{IndexerError, Result, RowRejection};

/// A row keyed by column name, nested objects as JSON objects.
///
/// `serde_json::Map` keeps keys sorted, which gives discovery and encoding a
/// stable traversal order.
pub type RowTree = Map<String, Value>;

/// Fold `values` (aligned with `targets`) into a tree.
///
/// A target nested inside another target (`o` and `o.x`) merges into the
/// parent's object.
pub fn build_row_tree(targets: &[ColumnPath], values: &[Value]) -> Result<RowTree> {
    if targets.len() != values.len() {
        return Err(IndexerError::IndexerMisuse(format!(
            "Expected {} values for the target columns, got {}",
            targets.len(),
            values.len()
        )));
    }

    let mut tree = RowTree::new();
    for (path, value) in targets.iter().zip(values) {
        insert(&mut tree, path, value.clone())?;
    }
    Ok(tree)
}

fn insert(tree: &mut RowTree, path: &ColumnPath, value: Value) -> Result<()> {
    let (leaf, parents) = match path.segments().split_last() {
        Some(split) => split,
        None => return Ok(()),
    };

    let mut current = tree;
    for (depth, segment) in parents.iter().enumerate() {
        let slot = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match slot {
            Value::Object(map) => map,
            other => {
                return Err(not_an_object(
                    &ColumnPath::from_segments(path.segments()[..=depth].to_vec())
                        .unwrap_or_else(|| path.clone()),
                    other,
                ))
            }
        };
    }

    match (current.get_mut(leaf), value) {
        (None, value) => {
            current.insert(leaf.clone(), value);
        }
        (Some(Value::Object(existing)), Value::Object(incoming)) => {
            for (key, value) in incoming {
                existing.entry(key).or_insert(value);
            }
        }
        (Some(existing), _) => return Err(not_an_object(path, existing)),
    }
    Ok(())
}

fn not_an_object(path: &ColumnPath, value: &Value) -> IndexerError {
    RowRejection::InvalidValue {
        column: path.to_string(),
        value: value.to_string(),
        data_type: "OBJECT".to_string(),
        reason: "value conflicts with a nested target column".to_string(),
    }
    .into()
}

/// Value at `path`, `None` if any segment is absent
pub fn get_path<'a>(tree: &'a RowTree, path: &ColumnPath) -> Option<&'a Value> {
    let (leaf, parents) = path.segments().split_last()?;
    let mut current = tree;
    for segment in parents {
        current = current.get(segment)?.as_object()?;
    }
    current.get(leaf)
}

/// True if the object that would hold `path` is present in the row
pub fn parent_present(tree: &RowTree, path: &ColumnPath) -> bool {
    match path.parent() {
        None => true,
        Some(parent) => matches!(get_path(tree, &parent), Some(Value::Object(_))),
    }
}

/// Set `path` to `value`. Returns false when the parent object is absent.
pub(crate) fn set_path(tree: &mut RowTree, path: &ColumnPath, value: Value) -> bool {
    let Some((leaf, parents)) = path.segments().split_last() else {
        return false;
    };
    let mut current = tree;
    for segment in parents {
        current = match current.get_mut(segment) {
            Some(Value::Object(map)) => map,
            _ => return false,
        };
    }
    current.insert(leaf.clone(), value);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_targets_merge() {
        let targets = vec![ColumnPath::new("o", ["x"]), ColumnPath::root("o"), ColumnPath::root("id")];
        let tree = build_row_tree(&targets, &[json!(1), json!({"y": 2}), json!(7)]).unwrap();
        assert_eq!(Value::Object(tree), json!({"id": 7, "o": {"x": 1, "y": 2}}));
    }

    #[test]
    fn test_length_mismatch_is_misuse() {
        let err = build_row_tree(&[ColumnPath::root("a")], &[]).unwrap_err();
        assert!(matches!(err, IndexerError::IndexerMisuse(_)));
    }

    #[test]
    fn test_scalar_parent_conflict_rejects_row() {
        let targets = vec![ColumnPath::root("o"), ColumnPath::new("o", ["x"])];
        let err = build_row_tree(&targets, &[json!(5), json!(1)]).unwrap_err();
        assert!(err.is_row_rejection());
    }

    #[test]
    fn test_get_and_set_path() {
        let mut tree = build_row_tree(&[ColumnPath::root("o")], &[json!({"a": null})]).unwrap();
        assert_eq!(get_path(&tree, &ColumnPath::new("o", ["a"])), Some(&Value::Null));
        assert_eq!(get_path(&tree, &ColumnPath::new("o", ["b"])), None);
        assert!(parent_present(&tree, &ColumnPath::new("o", ["b"])));
        assert!(!parent_present(&tree, &ColumnPath::new("p", ["b"])));

        assert!(set_path(&mut tree, &ColumnPath::new("o", ["b"]), json!(3)));
        assert!(!set_path(&mut tree, &ColumnPath::new("p", ["b"]), json!(3)));
        assert_eq!(get_path(&tree, &ColumnPath::new("o", ["b"])), Some(&json!(3)));
    }
}
