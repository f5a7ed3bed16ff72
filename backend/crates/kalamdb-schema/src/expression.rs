//! Scalar SQL expressions for defaults, generated columns and check constraints
//!
//! Expressions are parsed once with the PostgreSQL dialect and bound to the
//! column paths they reference. Evaluation runs over `serde_json` values with
//! SQL null semantics: most operators yield NULL when an operand is NULL, and
//! AND/OR use three-valued logic.
//!
//! ```text
//! "price * qty"  →  Parser::parse_expr  →  validate + collect refs  →  BoundExpression
//!                                                                          ↓
//!                                      evaluate(|path| row value)  →  serde_json::Value
//! ```

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value as JsonValue};
use sqlparser::ast::{
    BinaryOperator, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, Ident, UnaryOperator,
    Value,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::ALL_KEYWORDS;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use crate::column_path::ColumnPath;
use crate::error::{Result, SchemaError};

const SUPPORTED_FUNCTIONS: [&str; 9] = [
    "abs",
    "lower",
    "upper",
    "length",
    "char_length",
    "concat",
    "coalesce",
    "now",
    "current_timestamp",
];

/// Parsed expression together with the column paths it references
#[derive(Debug, Clone)]
pub struct BoundExpression {
    source: String,
    expr: Expr,
    columns: Vec<ColumnPath>,
}

impl BoundExpression {
    /// Parse and validate an expression.
    ///
    /// Only the constructs [`BoundExpression::evaluate`] understands are
    /// accepted, so a bound expression never fails for structural reasons at
    /// row time.
    pub fn parse(source: &str) -> Result<Self> {
        let dialect = PostgreSqlDialect {};
        let invalid = |reason: String| SchemaError::InvalidExpression {
            expression: source.to_string(),
            reason,
        };

        let mut parser = Parser::new(&dialect)
            .try_with_sql(source)
            .map_err(|e| invalid(e.to_string()))?;
        let expr = parser.parse_expr().map_err(|e| invalid(e.to_string()))?;
        let trailing = parser.peek_token();
        if trailing.token != Token::EOF {
            return Err(invalid(format!("unexpected trailing input '{}'", trailing.token)));
        }

        validate(&expr).map_err(invalid)?;

        let mut columns = Vec::new();
        collect_columns(&expr, &mut columns);

        Ok(Self {
            source: source.trim().to_string(),
            expr,
            columns,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Referenced column paths, in first-occurrence order
    pub fn columns(&self) -> &[ColumnPath] {
        &self.columns
    }

    /// True if the expression references `path` or anything below it
    pub fn references_within(&self, path: &ColumnPath) -> bool {
        self.columns.iter().any(|c| c.is_within(path))
    }

    /// Rewrite column references. `rename` returns the new path for a
    /// reference or `None` to keep it. The source text is re-rendered from
    /// the rewritten tree.
    pub fn rename_columns<F>(&self, rename: F) -> Self
    where
        F: Fn(&ColumnPath) -> Option<ColumnPath>,
    {
        let mut expr = self.expr.clone();
        let mut changed = false;
        rewrite_columns(&mut expr, &rename, &mut changed);
        if !changed {
            return self.clone();
        }

        let mut columns = Vec::new();
        collect_columns(&expr, &mut columns);
        Self {
            source: expr.to_string(),
            expr,
            columns,
        }
    }

    /// Evaluate with `lookup` resolving column references (absent values
    /// should be returned as `JsonValue::Null`).
    pub fn evaluate<F>(&self, lookup: &F) -> Result<JsonValue>
    where
        F: Fn(&ColumnPath) -> JsonValue,
    {
        Evaluator {
            source: &self.source,
            lookup,
        }
        .eval(&self.expr)
    }
}

impl PartialEq for BoundExpression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for BoundExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// Serialized as its source text and re-parsed on load
impl Serialize for BoundExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for BoundExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        BoundExpression::parse(&source).map_err(serde::de::Error::custom)
    }
}

fn column_path(expr: &Expr) -> Option<ColumnPath> {
    match expr {
        Expr::Identifier(ident) => Some(ColumnPath::root(ident.value.clone())),
        Expr::CompoundIdentifier(idents) => {
            ColumnPath::from_segments(idents.iter().map(|i| i.value.clone()).collect())
        }
        _ => None,
    }
}

/// Identifier that renders back to `name` when the source is re-parsed.
///
/// Anything but a plain non-keyword identifier is double-quoted.
fn ident(name: &str) -> Ident {
    let mut chars = name.chars();
    let plain = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && ALL_KEYWORDS.binary_search(&name.to_ascii_uppercase().as_str()).is_err();
    if plain {
        Ident::new(name)
    } else {
        Ident::with_quote('"', name)
    }
}

fn function_args(args: &FunctionArguments) -> std::result::Result<Vec<&Expr>, String> {
    match args {
        FunctionArguments::None => Ok(Vec::new()),
        FunctionArguments::List(list) => list
            .args
            .iter()
            .map(|arg| match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => Ok(e),
                other => Err(format!("unsupported function argument '{}'", other)),
            })
            .collect(),
        FunctionArguments::Subquery(_) => Err("subqueries are not supported".to_string()),
    }
}

fn validate(expr: &Expr) -> std::result::Result<(), String> {
    match expr {
        Expr::Identifier(_) | Expr::CompoundIdentifier(_) => Ok(()),
        Expr::Value(v) => match &v.value {
            Value::Number(_, _)
            | Value::SingleQuotedString(_)
            | Value::DoubleQuotedString(_)
            | Value::Boolean(_)
            | Value::Null => Ok(()),
            other => Err(format!("unsupported literal '{}'", other)),
        },
        Expr::Nested(inner) | Expr::IsNull(inner) | Expr::IsNotNull(inner) => validate(inner),
        Expr::UnaryOp { op, expr } => match op {
            UnaryOperator::Not | UnaryOperator::Minus | UnaryOperator::Plus => validate(expr),
            other => Err(format!("unsupported operator '{}'", other)),
        },
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::Plus
            | BinaryOperator::Minus
            | BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::Modulo
            | BinaryOperator::StringConcat
            | BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq
            | BinaryOperator::And
            | BinaryOperator::Or => {
                validate(left)?;
                validate(right)
            }
            other => Err(format!("unsupported operator '{}'", other)),
        },
        Expr::InList { expr, list, .. } => {
            validate(expr)?;
            list.iter().try_for_each(validate)
        }
        Expr::Function(func) => {
            let name = func.name.to_string().to_lowercase();
            if !SUPPORTED_FUNCTIONS.contains(&name.as_str()) {
                return Err(format!("unknown function '{}'", name));
            }
            if func.over.is_some() || func.filter.is_some() {
                return Err(format!("window or filter clauses are not allowed on '{}'", name));
            }
            function_args(&func.args)?
                .into_iter()
                .try_for_each(validate)
        }
        other => Err(format!("unsupported expression '{}'", other)),
    }
}

fn collect_columns(expr: &Expr, out: &mut Vec<ColumnPath>) {
    if let Some(path) = column_path(expr) {
        if !out.contains(&path) {
            out.push(path);
        }
        return;
    }
    match expr {
        Expr::Nested(inner) | Expr::IsNull(inner) | Expr::IsNotNull(inner) => {
            collect_columns(inner, out)
        }
        Expr::UnaryOp { expr, .. } => collect_columns(expr, out),
        Expr::BinaryOp { left, right, .. } => {
            collect_columns(left, out);
            collect_columns(right, out);
        }
        Expr::InList { expr, list, .. } => {
            collect_columns(expr, out);
            for item in list {
                collect_columns(item, out);
            }
        }
        Expr::Function(func) => {
            if let Ok(args) = function_args(&func.args) {
                for arg in args {
                    collect_columns(arg, out);
                }
            }
        }
        _ => {}
    }
}

fn rewrite_columns<F>(expr: &mut Expr, rename: &F, changed: &mut bool)
where
    F: Fn(&ColumnPath) -> Option<ColumnPath>,
{
    if let Some(path) = column_path(expr) {
        if let Some(new_path) = rename(&path) {
            if new_path != path {
                *expr = if new_path.is_root() {
                    Expr::Identifier(ident(new_path.name()))
                } else {
                    Expr::CompoundIdentifier(new_path.segments().iter().map(|s| ident(s)).collect())
                };
                *changed = true;
            }
        }
        return;
    }
    match expr {
        Expr::Nested(inner) | Expr::IsNull(inner) | Expr::IsNotNull(inner) => {
            rewrite_columns(inner, rename, changed)
        }
        Expr::UnaryOp { expr, .. } => rewrite_columns(expr, rename, changed),
        Expr::BinaryOp { left, right, .. } => {
            rewrite_columns(left, rename, changed);
            rewrite_columns(right, rename, changed);
        }
        Expr::InList { expr, list, .. } => {
            rewrite_columns(expr, rename, changed);
            for item in list.iter_mut() {
                rewrite_columns(item, rename, changed);
            }
        }
        Expr::Function(func) => {
            if let FunctionArguments::List(list) = &mut func.args {
                for arg in list.args.iter_mut() {
                    if let FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) = arg {
                        rewrite_columns(e, rename, changed);
                    }
                }
            }
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn from_json(value: &JsonValue) -> Option<Num> {
        match value {
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Some(Num::Int(i)),
                None => n.as_f64().map(Num::Float),
            },
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn into_json(self) -> JsonValue {
        match self {
            Num::Int(i) => JsonValue::Number(i.into()),
            Num::Float(f) => Number::from_f64(f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
        }
    }
}

struct Evaluator<'a, F> {
    source: &'a str,
    lookup: &'a F,
}

impl<'a, F> Evaluator<'a, F>
where
    F: Fn(&ColumnPath) -> JsonValue,
{
    fn error(&self, reason: impl Into<String>) -> SchemaError {
        SchemaError::ExpressionEvaluation {
            expression: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn eval(&self, expr: &Expr) -> Result<JsonValue> {
        if let Some(path) = column_path(expr) {
            return Ok((self.lookup)(&path));
        }
        match expr {
            Expr::Value(v) => self.literal(&v.value),
            Expr::Nested(inner) => self.eval(inner),
            Expr::IsNull(inner) => Ok(JsonValue::Bool(self.eval(inner)?.is_null())),
            Expr::IsNotNull(inner) => Ok(JsonValue::Bool(!self.eval(inner)?.is_null())),
            Expr::UnaryOp { op, expr } => {
                let value = self.eval(expr)?;
                match op {
                    UnaryOperator::Not => match value {
                        JsonValue::Null => Ok(JsonValue::Null),
                        JsonValue::Bool(b) => Ok(JsonValue::Bool(!b)),
                        other => Err(self.error(format!("NOT expects a boolean, got {}", other))),
                    },
                    UnaryOperator::Minus => match Num::from_json(&value) {
                        _ if value.is_null() => Ok(JsonValue::Null),
                        Some(Num::Int(i)) => i
                            .checked_neg()
                            .map(|n| JsonValue::Number(n.into()))
                            .ok_or_else(|| self.error("integer overflow")),
                        Some(Num::Float(f)) => Ok(Num::Float(-f).into_json()),
                        None => Err(self.error(format!("cannot negate {}", value))),
                    },
                    _ => Ok(value),
                }
            }
            Expr::BinaryOp { left, op, right } => self.binary(left, op, right),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let needle = self.eval(expr)?;
                if needle.is_null() {
                    return Ok(JsonValue::Null);
                }
                let mut saw_null = false;
                for item in list {
                    let candidate = self.eval(item)?;
                    if candidate.is_null() {
                        saw_null = true;
                    } else if values_equal(&needle, &candidate) {
                        return Ok(JsonValue::Bool(!negated));
                    }
                }
                if saw_null {
                    Ok(JsonValue::Null)
                } else {
                    Ok(JsonValue::Bool(*negated))
                }
            }
            Expr::Function(func) => {
                let name = func.name.to_string().to_lowercase();
                let args = function_args(&func.args).map_err(|e| self.error(e))?;
                let values = args
                    .into_iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                self.function(&name, values)
            }
            other => Err(self.error(format!("unsupported expression '{}'", other))),
        }
    }

    fn literal(&self, value: &Value) -> Result<JsonValue> {
        match value {
            Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => {
                Ok(JsonValue::String(s.clone()))
            }
            Value::Number(n, _) => {
                if let Ok(i) = n.parse::<i64>() {
                    Ok(JsonValue::Number(i.into()))
                } else if let Ok(f) = n.parse::<f64>() {
                    Ok(Num::Float(f).into_json())
                } else {
                    Err(self.error(format!("invalid number '{}'", n)))
                }
            }
            Value::Boolean(b) => Ok(JsonValue::Bool(*b)),
            Value::Null => Ok(JsonValue::Null),
            other => Err(self.error(format!("unsupported literal '{}'", other))),
        }
    }

    fn binary(&self, left: &Expr, op: &BinaryOperator, right: &Expr) -> Result<JsonValue> {
        let lhs = self.eval(left)?;
        let rhs = self.eval(right)?;

        match op {
            BinaryOperator::And => Ok(match (self.boolean(&lhs)?, self.boolean(&rhs)?) {
                (Some(false), _) | (_, Some(false)) => JsonValue::Bool(false),
                (Some(true), Some(true)) => JsonValue::Bool(true),
                _ => JsonValue::Null,
            }),
            BinaryOperator::Or => Ok(match (self.boolean(&lhs)?, self.boolean(&rhs)?) {
                (Some(true), _) | (_, Some(true)) => JsonValue::Bool(true),
                (Some(false), Some(false)) => JsonValue::Bool(false),
                _ => JsonValue::Null,
            }),
            _ if lhs.is_null() || rhs.is_null() => Ok(JsonValue::Null),
            BinaryOperator::StringConcat => Ok(JsonValue::String(format!(
                "{}{}",
                text_of(&lhs),
                text_of(&rhs)
            ))),
            BinaryOperator::Eq => Ok(JsonValue::Bool(values_equal(&lhs, &rhs))),
            BinaryOperator::NotEq => Ok(JsonValue::Bool(!values_equal(&lhs, &rhs))),
            BinaryOperator::Lt | BinaryOperator::LtEq | BinaryOperator::Gt | BinaryOperator::GtEq => {
                let ordering = compare_values(&lhs, &rhs)
                    .ok_or_else(|| self.error(format!("cannot compare {} with {}", lhs, rhs)))?;
                let result = match op {
                    BinaryOperator::Lt => ordering == Ordering::Less,
                    BinaryOperator::LtEq => ordering != Ordering::Greater,
                    BinaryOperator::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                };
                Ok(JsonValue::Bool(result))
            }
            _ => {
                let (a, b) = match (Num::from_json(&lhs), Num::from_json(&rhs)) {
                    (Some(a), Some(b)) => (a, b),
                    _ => {
                        return Err(self.error(format!(
                            "operator '{}' expects numbers, got {} and {}",
                            op, lhs, rhs
                        )))
                    }
                };
                self.arithmetic(op, a, b).map(Num::into_json)
            }
        }
    }

    fn arithmetic(&self, op: &BinaryOperator, a: Num, b: Num) -> Result<Num> {
        match (a, b) {
            (Num::Int(x), Num::Int(y)) => {
                let result = match op {
                    BinaryOperator::Plus => x.checked_add(y),
                    BinaryOperator::Minus => x.checked_sub(y),
                    BinaryOperator::Multiply => x.checked_mul(y),
                    BinaryOperator::Divide | BinaryOperator::Modulo if y == 0 => {
                        return Err(self.error("division by zero"))
                    }
                    BinaryOperator::Divide => x.checked_div(y),
                    BinaryOperator::Modulo => x.checked_rem(y),
                    other => return Err(self.error(format!("unsupported operator '{}'", other))),
                };
                result.map(Num::Int).ok_or_else(|| self.error("integer overflow"))
            }
            _ => {
                let (x, y) = (a.as_f64(), b.as_f64());
                let result = match op {
                    BinaryOperator::Plus => x + y,
                    BinaryOperator::Minus => x - y,
                    BinaryOperator::Multiply => x * y,
                    BinaryOperator::Divide | BinaryOperator::Modulo if y == 0.0 => {
                        return Err(self.error("division by zero"))
                    }
                    BinaryOperator::Divide => x / y,
                    BinaryOperator::Modulo => x % y,
                    other => return Err(self.error(format!("unsupported operator '{}'", other))),
                };
                Ok(Num::Float(result))
            }
        }
    }

    fn boolean(&self, value: &JsonValue) -> Result<Option<bool>> {
        match value {
            JsonValue::Null => Ok(None),
            JsonValue::Bool(b) => Ok(Some(*b)),
            other => Err(self.error(format!("expected a boolean, got {}", other))),
        }
    }

    fn function(&self, name: &str, args: Vec<JsonValue>) -> Result<JsonValue> {
        let single = |args: &[JsonValue]| -> Result<JsonValue> {
            match args {
                [value] => Ok(value.clone()),
                _ => Err(self.error(format!("{}() takes exactly one argument", name))),
            }
        };

        match name {
            "now" | "current_timestamp" => {
                Ok(JsonValue::Number(chrono::Utc::now().timestamp_millis().into()))
            }
            "coalesce" => Ok(args
                .into_iter()
                .find(|v| !v.is_null())
                .unwrap_or(JsonValue::Null)),
            "concat" => Ok(JsonValue::String(
                args.iter()
                    .filter(|v| !v.is_null())
                    .map(text_of)
                    .collect::<String>(),
            )),
            "abs" => match single(&args)? {
                JsonValue::Null => Ok(JsonValue::Null),
                value => match Num::from_json(&value) {
                    Some(Num::Int(i)) => i
                        .checked_abs()
                        .map(|n| JsonValue::Number(n.into()))
                        .ok_or_else(|| self.error("integer overflow")),
                    Some(Num::Float(f)) => Ok(Num::Float(f.abs()).into_json()),
                    None => Err(self.error(format!("abs() expects a number, got {}", value))),
                },
            },
            "lower" | "upper" | "length" | "char_length" => match single(&args)? {
                JsonValue::Null => Ok(JsonValue::Null),
                JsonValue::String(s) => Ok(match name {
                    "lower" => JsonValue::String(s.to_lowercase()),
                    "upper" => JsonValue::String(s.to_uppercase()),
                    _ => JsonValue::Number((s.chars().count() as i64).into()),
                }),
                other => Err(self.error(format!("{}() expects text, got {}", name, other))),
            },
            other => Err(self.error(format!("unknown function '{}'", other))),
        }
    }
}

fn text_of(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// SQL equality: numbers compare by value regardless of representation
pub fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (Num::from_json(a), Num::from_json(b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
        (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_values(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => match (Num::from_json(a)?, Num::from_json(b)?) {
            (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
            (x, y) => x.as_f64().partial_cmp(&y.as_f64()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval_with(source: &str, row: JsonValue) -> JsonValue {
        let expr = BoundExpression::parse(source).unwrap();
        let lookup = |path: &ColumnPath| {
            let mut current = &row;
            for segment in path.segments() {
                match current.get(segment) {
                    Some(v) => current = v,
                    None => return JsonValue::Null,
                }
            }
            current.clone()
        };
        expr.evaluate(&lookup).unwrap()
    }

    #[test]
    fn test_collects_referenced_columns() {
        let expr = BoundExpression::parse("a + o.x * a > coalesce(b, 0)").unwrap();
        let cols: Vec<String> = expr.columns().iter().map(|c| c.to_string()).collect();
        assert_eq!(cols, vec!["a", "o.x", "b"]);
        assert!(expr.references_within(&ColumnPath::root("o")));
    }

    #[test]
    fn test_rejects_unsupported_constructs() {
        assert!(BoundExpression::parse("a +").is_err());
        assert!(BoundExpression::parse("a b").is_err());
        assert!(BoundExpression::parse("(SELECT 1)").is_err());
        assert!(BoundExpression::parse("md5(a)").is_err());
        assert!(BoundExpression::parse("a LIKE 'x%'").is_err());
    }

    #[test]
    fn test_arithmetic_and_concat() {
        assert_eq!(eval_with("a * 2 + 1", json!({"a": 4})), json!(9));
        assert_eq!(eval_with("a / 2", json!({"a": 7})), json!(3));
        assert_eq!(eval_with("a / 2.0", json!({"a": 7})), json!(3.5));
        assert_eq!(eval_with("'x' || a", json!({"a": 1})), json!("x1"));
        assert_eq!(eval_with("lower(name)", json!({"name": "AbC"})), json!("abc"));
        assert_eq!(eval_with("length(name)", json!({"name": "héllo"})), json!(5));
    }

    #[test]
    fn test_null_semantics() {
        assert_eq!(eval_with("a + 1", json!({})), JsonValue::Null);
        assert_eq!(eval_with("a > 0", json!({"a": null})), JsonValue::Null);
        assert_eq!(eval_with("a > 0 OR true", json!({})), json!(true));
        assert_eq!(eval_with("a > 0 AND false", json!({})), json!(false));
        assert_eq!(eval_with("a IS NULL", json!({})), json!(true));
        assert_eq!(eval_with("a IN (1, NULL)", json!({"a": 2})), JsonValue::Null);
        assert_eq!(eval_with("a IN (1, 2)", json!({"a": 2})), json!(true));
        assert_eq!(eval_with("a NOT IN (1, 2)", json!({"a": 3})), json!(true));
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        let expr = BoundExpression::parse("a / 0").unwrap();
        let result = expr.evaluate(&|_: &ColumnPath| json!(1));
        assert!(matches!(result, Err(SchemaError::ExpressionEvaluation { .. })));
    }

    #[test]
    fn test_rename_rewrites_source() {
        let expr = BoundExpression::parse("o.x + y").unwrap();
        let from = ColumnPath::root("o");
        let to = ColumnPath::root("obj");
        let renamed = expr.rename_columns(|p| p.replace_prefix(&from, &to));
        assert_eq!(renamed.source(), "obj.x + y");
        assert_eq!(renamed.columns()[0], ColumnPath::new("obj", ["x"]));

        let untouched = expr.rename_columns(|_| None);
        assert_eq!(untouched.source(), "o.x + y");
    }

    #[test]
    fn test_now_returns_epoch_millis() {
        let value = eval_with("now()", json!({}));
        assert!(value.as_i64().unwrap() > 1_600_000_000_000);
    }
}
