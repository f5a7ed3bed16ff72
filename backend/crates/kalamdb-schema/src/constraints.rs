//! Check constraints and derived full-text index columns

use serde::{Deserialize, Serialize};

use crate::column_path::ColumnPath;
use crate::expression::BoundExpression;
use crate::ids::ColumnId;

/// Named boolean expression every written row must not violate.
///
/// A row satisfies the constraint when the expression yields TRUE or NULL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConstraint {
    pub name: String,
    pub expression: BoundExpression,
}

impl CheckConstraint {
    pub fn columns(&self) -> &[ColumnPath] {
        self.expression.columns()
    }
}

/// Unbound check constraint as written by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraintDef {
    pub name: String,
    pub expression: String,
}

impl CheckConstraintDef {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Analyzer {
    /// Lowercased alphanumeric tokens
    Standard,
    /// The whole value as a single token
    Keyword,
}

impl Analyzer {
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        match self {
            Analyzer::Keyword => {
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![text.to_string()]
                }
            }
            Analyzer::Standard => text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|token| !token.is_empty())
                .map(str::to_lowercase)
                .collect(),
        }
    }
}

/// Full-text index column fed by one or more text source columns.
///
/// Has a column id of its own (so its search fields are keyed stably) but no
/// stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub name: String,
    pub column_id: ColumnId,
    pub sources: Vec<ColumnPath>,
    pub analyzer: Analyzer,
}

impl IndexColumn {
    pub fn new(name: impl Into<String>, sources: Vec<ColumnPath>, analyzer: Analyzer) -> Self {
        Self {
            name: name.into(),
            column_id: ColumnId::UNASSIGNED,
            sources,
            analyzer,
        }
    }

    pub fn uses(&self, path: &ColumnPath) -> bool {
        self.sources.iter().any(|source| source.is_within(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_analyzer() {
        assert_eq!(
            Analyzer::Standard.tokenize("Hello, World! 42x"),
            vec!["hello", "world", "42x"]
        );
        assert!(Analyzer::Standard.tokenize(" ,. ").is_empty());
    }

    #[test]
    fn test_keyword_analyzer() {
        assert_eq!(Analyzer::Keyword.tokenize("Hello World"), vec!["Hello World"]);
        assert!(Analyzer::Keyword.tokenize("").is_empty());
    }
}
