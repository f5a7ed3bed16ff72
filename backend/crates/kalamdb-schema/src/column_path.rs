//! Column paths
//!
//! A column is addressed by its root name plus zero or more nested segments.
//! `o.x.y` and `o['x']['y']` denote the same path. Paths order
//! lexicographically by segment, so every descendant of a path sorts directly
//! after it; `TableSchema` relies on that for subtree range scans.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawColumnPath")]
pub struct ColumnPath {
    segments: Vec<String>,
}

/// Wire shape of [`ColumnPath`], checked for a root segment on load
#[derive(Deserialize)]
struct RawColumnPath {
    segments: Vec<String>,
}

impl TryFrom<RawColumnPath> for ColumnPath {
    type Error = SchemaError;

    fn try_from(raw: RawColumnPath) -> Result<Self> {
        if raw.segments.iter().any(String::is_empty) {
            return Err(SchemaError::InvalidSchema("Column path has an empty segment".to_string()));
        }
        Self::from_segments(raw.segments)
            .ok_or_else(|| SchemaError::InvalidSchema("Column path has no segments".to_string()))
    }
}

impl ColumnPath {
    /// Path of a top-level column
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// Build a path from its root name and nested segments
    pub fn new(root: impl Into<String>, nested: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut segments = vec![root.into()];
        segments.extend(nested.into_iter().map(Into::into));
        Self { segments }
    }

    /// Returns `None` for an empty segment list
    pub fn from_segments(segments: Vec<String>) -> Option<Self> {
        if segments.is_empty() {
            None
        } else {
            Some(Self { segments })
        }
    }

    /// Parse `o.x.y`, `o['x']['y']` or a mix of both.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            SchemaError::InvalidSchema(format!("Invalid column path '{}': {}", input, reason))
        };

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = input.trim().chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if current.is_empty() {
                        return Err(invalid("empty segment"));
                    }
                    segments.push(std::mem::take(&mut current));
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(std::mem::take(&mut current));
                    } else if segments.is_empty() {
                        return Err(invalid("subscript without a root column"));
                    }
                    if chars.next() != Some('\'') {
                        return Err(invalid("expected a quoted subscript"));
                    }
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('\'') => break,
                            Some(ch) => name.push(ch),
                            None => return Err(invalid("unterminated subscript")),
                        }
                    }
                    if chars.next() != Some(']') {
                        return Err(invalid("expected ']'"));
                    }
                    if name.is_empty() {
                        return Err(invalid("empty segment"));
                    }
                    segments.push(name);
                    if chars.peek() == Some(&'.') {
                        chars.next();
                        if chars.peek().is_none() {
                            return Err(invalid("empty segment"));
                        }
                    }
                }
                _ => current.push(c),
            }
        }

        if !current.is_empty() {
            segments.push(current);
        } else if input.trim().ends_with('.') || segments.is_empty() {
            return Err(invalid("empty segment"));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn root_name(&self) -> &str {
        &self.segments[0]
    }

    /// Leaf name, the last segment
    pub fn name(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// Nested segments below the root
    pub fn nested(&self) -> &[String] {
        &self.segments[1..]
    }

    /// 1 for a top-level column
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    pub fn parent(&self) -> Option<ColumnPath> {
        if self.is_root() {
            None
        } else {
            Some(Self {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            })
        }
    }

    /// All ancestors, nearest first
    pub fn ancestors(&self) -> Vec<ColumnPath> {
        (1..self.segments.len())
            .rev()
            .map(|len| Self {
                segments: self.segments[..len].to_vec(),
            })
            .collect()
    }

    pub fn child(&self, name: impl Into<String>) -> ColumnPath {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Self { segments }
    }

    /// Same parent, different leaf name
    pub fn with_name(&self, name: impl Into<String>) -> ColumnPath {
        let mut segments = self.segments.clone();
        let last = segments.len() - 1;
        segments[last] = name.into();
        Self { segments }
    }

    /// True if `self` lies strictly below `ancestor`
    pub fn is_descendant_of(&self, ancestor: &ColumnPath) -> bool {
        self.segments.len() > ancestor.segments.len()
            && self.segments[..ancestor.segments.len()] == ancestor.segments[..]
    }

    /// True if `self` equals `other` or lies below it
    pub fn is_within(&self, other: &ColumnPath) -> bool {
        self == other || self.is_descendant_of(other)
    }

    /// Replace the `from` prefix by `to`. Returns `None` if `self` is not
    /// within `from`.
    pub fn replace_prefix(&self, from: &ColumnPath, to: &ColumnPath) -> Option<ColumnPath> {
        if !self.is_within(from) {
            return None;
        }
        let mut segments = to.segments.clone();
        segments.extend_from_slice(&self.segments[from.segments.len()..]);
        Some(Self { segments })
    }

    /// SQL subscript notation: `o['x']['y']`
    pub fn sql_fqn(&self) -> String {
        let mut out = self.segments[0].clone();
        for segment in self.nested() {
            out.push_str("['");
            out.push_str(segment);
            out.push_str("']");
        }
        out
    }
}

impl fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for ColumnPath {
    /// Dotted form without validation; use [`ColumnPath::parse`] for user input
    fn from(value: &str) -> Self {
        Self {
            segments: value.split('.').map(str::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotted_and_subscript() {
        let dotted = ColumnPath::parse("o.x.y").unwrap();
        let subscript = ColumnPath::parse("o['x']['y']").unwrap();
        assert_eq!(dotted, subscript);
        assert_eq!(dotted.root_name(), "o");
        assert_eq!(dotted.name(), "y");
        assert_eq!(dotted.depth(), 3);
        assert_eq!(dotted.sql_fqn(), "o['x']['y']");
        assert_eq!(dotted.to_string(), "o.x.y");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ColumnPath::parse("").is_err());
        assert!(ColumnPath::parse("o..x").is_err());
        assert!(ColumnPath::parse("o.").is_err());
        assert!(ColumnPath::parse("['x']").is_err());
        assert!(ColumnPath::parse("o['x'").is_err());
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let path = ColumnPath::new("a", ["b", "c"]);
        let ancestors: Vec<String> = path.ancestors().iter().map(|p| p.to_string()).collect();
        assert_eq!(ancestors, vec!["a.b", "a"]);
        assert!(ColumnPath::root("a").ancestors().is_empty());
    }

    #[test]
    fn test_descendants_sort_after_parent() {
        let mut paths = vec![
            ColumnPath::root("b"),
            ColumnPath::new("a", ["z"]),
            ColumnPath::root("a"),
            ColumnPath::new("a", ["b", "c"]),
        ];
        paths.sort();
        let names: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
        assert_eq!(names, vec!["a", "a.b.c", "a.z", "b"]);
    }

    #[test]
    fn test_replace_prefix() {
        let path = ColumnPath::new("o", ["x", "y"]);
        let from = ColumnPath::new("o", ["x"]);
        let to = ColumnPath::new("o", ["renamed"]);
        assert_eq!(
            path.replace_prefix(&from, &to),
            Some(ColumnPath::new("o", ["renamed", "y"]))
        );
        assert_eq!(ColumnPath::root("p").replace_prefix(&from, &to), None);
        assert!(path.is_descendant_of(&from));
        assert!(!from.is_descendant_of(&from));
        assert!(from.is_within(&from));
    }

    #[test]
    fn test_deserialize_requires_segments() {
        let path: ColumnPath = serde_json::from_str(r#"{"segments":["o","x"]}"#).unwrap();
        assert_eq!(path, ColumnPath::new("o", ["x"]));
        assert!(serde_json::from_str::<ColumnPath>(r#"{"segments":[]}"#).is_err());
        assert!(serde_json::from_str::<ColumnPath>(r#"{"segments":["o",""]}"#).is_err());
    }
}
