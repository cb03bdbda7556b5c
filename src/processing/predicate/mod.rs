//! Row predicates written in a small pandas-`query`-like expression language.
//!
//! ```rust
//! use csv_ndjson_stream::processing::Predicate;
//! use csv_ndjson_stream::types::{DataType, Field, Schema, Value};
//!
//! let schema = Schema::new(vec![
//!     Field::new("category", DataType::Utf8),
//!     Field::new("value", DataType::Int64),
//! ]);
//! let pred = Predicate::parse("value > 10 and category in ['a', 'b']").unwrap();
//! let bound = pred.bind(&schema).unwrap();
//!
//! assert!(bound.matches(&[Value::Utf8("a".into()), Value::Int64(11)]).unwrap());
//! assert!(!bound.matches(&[Value::Utf8("c".into()), Value::Int64(11)]).unwrap());
//! ```
//!
//! Null compares like a floating-point NaN: `==` and ordering comparisons are false, `!=` is
//! true, and arithmetic with null yields null.

mod parser;

use std::borrow::Cow;
use std::cmp::Ordering;

use crate::error::{StreamError, StreamResult};
use crate::types::{Schema, Value};

static NULL: Value = Value::Null;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Expression AST. Columns are referenced by slot into [`Predicate::columns`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column(usize),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Arith {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Cmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
}

/// A parsed filter expression, not yet tied to a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    source: String,
    expr: Expr,
    columns: Vec<String>,
}

impl Predicate {
    /// Parse `source`. Fails with [`StreamError::InvalidPredicate`] on a syntax error.
    pub fn parse(source: &str) -> StreamResult<Self> {
        let parsed = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            expr: parsed.expr,
            columns: parsed.columns,
        })
    }

    /// The original expression text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct column names referenced by the expression.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Resolve column references against `schema`.
    ///
    /// Fails with [`StreamError::InvalidPredicate`] when a referenced column does not exist.
    pub fn bind(&self, schema: &Schema) -> StreamResult<BoundPredicate<'_>> {
        let indices = self
            .columns
            .iter()
            .map(|name| {
                schema
                    .index_of(name)
                    .ok_or_else(|| StreamError::predicate(format!("name '{name}' is not defined")))
            })
            .collect::<StreamResult<Vec<_>>>()?;
        Ok(BoundPredicate {
            expr: &self.expr,
            indices,
        })
    }
}

/// A predicate whose columns are resolved to row positions of one schema.
#[derive(Debug, Clone)]
pub struct BoundPredicate<'a> {
    expr: &'a Expr,
    indices: Vec<usize>,
}

impl BoundPredicate<'_> {
    /// Evaluate against one row. Null results count as `false`.
    pub fn matches(&self, row: &[Value]) -> StreamResult<bool> {
        match eval(self.expr, row, &self.indices)?.as_ref() {
            Value::Bool(b) => Ok(*b),
            Value::Null => Ok(false),
            other => Err(StreamError::predicate(format!(
                "expression must evaluate to a boolean, got {other:?}"
            ))),
        }
    }
}

fn eval<'a>(expr: &'a Expr, row: &'a [Value], indices: &[usize]) -> StreamResult<Cow<'a, Value>> {
    Ok(match expr {
        Expr::Literal(v) => Cow::Borrowed(v),
        Expr::Column(slot) => {
            let v = indices.get(*slot).and_then(|idx| row.get(*idx));
            Cow::Borrowed(v.unwrap_or(&NULL))
        }
        Expr::Neg(inner) => Cow::Owned(match eval(inner, row, indices)?.as_ref() {
            Value::Null => Value::Null,
            Value::Int64(v) => v
                .checked_neg()
                .map(Value::Int64)
                .unwrap_or(Value::Float64(-(*v as f64))),
            Value::Float64(v) => Value::Float64(-v),
            other => {
                return Err(StreamError::predicate(format!("cannot negate {other:?}")));
            }
        }),
        Expr::Not(inner) => Cow::Owned(match truthiness(eval(inner, row, indices)?.as_ref())? {
            Some(b) => Value::Bool(!b),
            None => Value::Null,
        }),
        Expr::And(lhs, rhs) => {
            let l = truthiness(eval(lhs, row, indices)?.as_ref())?.unwrap_or(false);
            if !l {
                return Ok(Cow::Owned(Value::Bool(false)));
            }
            let r = truthiness(eval(rhs, row, indices)?.as_ref())?.unwrap_or(false);
            Cow::Owned(Value::Bool(r))
        }
        Expr::Or(lhs, rhs) => {
            let l = truthiness(eval(lhs, row, indices)?.as_ref())?.unwrap_or(false);
            if l {
                return Ok(Cow::Owned(Value::Bool(true)));
            }
            let r = truthiness(eval(rhs, row, indices)?.as_ref())?.unwrap_or(false);
            Cow::Owned(Value::Bool(r))
        }
        Expr::Arith { op, lhs, rhs } => {
            let l = eval(lhs, row, indices)?;
            let r = eval(rhs, row, indices)?;
            Cow::Owned(arith(*op, l.as_ref(), r.as_ref())?)
        }
        Expr::Cmp { op, lhs, rhs } => {
            let l = eval(lhs, row, indices)?;
            let r = eval(rhs, row, indices)?;
            Cow::Owned(Value::Bool(compare(*op, l.as_ref(), r.as_ref())?))
        }
        Expr::In {
            expr,
            list,
            negated,
        } => {
            let needle = eval(expr, row, indices)?;
            let mut found = false;
            for item in list {
                let candidate = eval(item, row, indices)?;
                if compare(CmpOp::Eq, needle.as_ref(), candidate.as_ref())? {
                    found = true;
                    break;
                }
            }
            Cow::Owned(Value::Bool(found != *negated))
        }
    })
}

fn truthiness(v: &Value) -> StreamResult<Option<bool>> {
    match v {
        Value::Bool(b) => Ok(Some(*b)),
        Value::Null => Ok(None),
        other => Err(StreamError::predicate(format!(
            "expected a boolean operand, got {other:?}"
        ))),
    }
}

fn arith(op: ArithOp, l: &Value, r: &Value) -> StreamResult<Value> {
    match (l, r) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Int64(a), Value::Int64(b)) if op != ArithOp::Div => {
            let exact = match op {
                ArithOp::Add => a.checked_add(*b),
                ArithOp::Sub => a.checked_sub(*b),
                ArithOp::Mul => a.checked_mul(*b),
                ArithOp::Div => None,
            };
            Ok(exact
                .map(Value::Int64)
                .unwrap_or_else(|| Value::Float64(float_arith(op, *a as f64, *b as f64))))
        }
        (Value::Utf8(a), Value::Utf8(b)) if op == ArithOp::Add => Ok(Value::Utf8(format!("{a}{b}"))),
        _ => match (as_number(l), as_number(r)) {
            (Some(a), Some(b)) => Ok(Value::Float64(float_arith(op, a, b))),
            _ => Err(StreamError::predicate(format!(
                "unsupported operand types for {op:?}: {l:?} and {r:?}"
            ))),
        },
    }
}

fn float_arith(op: ArithOp, a: f64, b: f64) -> f64 {
    match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Int64(v) => Some(*v as f64),
        Value::Float64(v) => Some(*v),
        _ => None,
    }
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> StreamResult<bool> {
    let ordering = match (l, r) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
        (Value::Utf8(a), Value::Utf8(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => match (as_number(l), as_number(r)) {
            // NaN compares as unordered.
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return match op {
                    CmpOp::Eq => Ok(false),
                    CmpOp::Ne => Ok(true),
                    _ => Err(StreamError::predicate(format!(
                        "'{op:?}' not supported between {l:?} and {r:?}"
                    ))),
                };
            }
        },
    };

    Ok(match (op, ordering) {
        (CmpOp::Ne, None) => true,
        (_, None) => false,
        (CmpOp::Eq, Some(o)) => o == Ordering::Equal,
        (CmpOp::Ne, Some(o)) => o != Ordering::Equal,
        (CmpOp::Lt, Some(o)) => o == Ordering::Less,
        (CmpOp::Lte, Some(o)) => o != Ordering::Greater,
        (CmpOp::Gt, Some(o)) => o == Ordering::Greater,
        (CmpOp::Gte, Some(o)) => o != Ordering::Less,
    })
}

#[cfg(test)]
mod tests {
    use super::Predicate;
    use crate::error::StreamError;
    use crate::types::{DataType, Field, Schema, Value};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("category", DataType::Utf8),
            Field::new("value", DataType::Int64),
            Field::new("score", DataType::Float64),
            Field::new("active", DataType::Bool),
        ])
    }

    fn row(category: &str, value: i64, score: Option<f64>, active: bool) -> Vec<Value> {
        vec![
            Value::Utf8(category.to_string()),
            Value::Int64(value),
            score.map(Value::Float64).unwrap_or(Value::Null),
            Value::Bool(active),
        ]
    }

    fn eval(expr: &str, row: &[Value]) -> Result<bool, StreamError> {
        let pred = Predicate::parse(expr)?;
        pred.bind(&schema())?.matches(row)
    }

    #[test]
    fn numeric_comparisons() {
        let r = row("a", 12, Some(1.5), true);
        assert!(eval("value > 10", &r).unwrap());
        assert!(!eval("value <= 10", &r).unwrap());
        assert!(eval("score >= 1.5", &r).unwrap());
        assert!(eval("value == 12.0", &r).unwrap());
        assert!(eval("value * 2 - 4 == 20", &r).unwrap());
        assert!(eval("value / 8 == 1.5", &r).unwrap());
    }

    #[test]
    fn logical_operators_and_symbols() {
        let r = row("a", 12, Some(1.5), false);
        assert!(eval("value > 10 and category == 'a'", &r).unwrap());
        assert!(eval("value > 100 or category == \"a\"", &r).unwrap());
        assert!(eval("(value > 10) & ~active", &r).unwrap());
        assert!(eval("not active | value < 0", &r).unwrap());
        assert!(eval("active == False", &r).unwrap());
    }

    #[test]
    fn membership() {
        let r = row("b", 3, None, true);
        assert!(eval("category in ['a', 'b']", &r).unwrap());
        assert!(!eval("category not in ('a', 'b')", &r).unwrap());
        assert!(eval("value in [1, 2, 3]", &r).unwrap());
    }

    #[test]
    fn null_behaves_like_nan() {
        let r = row("a", 1, None, true);
        assert!(!eval("score > 0", &r).unwrap());
        assert!(!eval("score == score", &r).unwrap());
        assert!(eval("score != 1", &r).unwrap());
        assert!(!eval("score + 1 > 0", &r).unwrap());
        assert!(eval("score == None or value == 1", &r).unwrap());
    }

    #[test]
    fn mixed_type_equality_is_false_but_ordering_fails() {
        let r = row("a", 1, None, true);
        assert!(!eval("category == 1", &r).unwrap());
        assert!(eval("category != 1", &r).unwrap());
        let err = eval("category > 1", &r).unwrap_err();
        assert!(matches!(err, StreamError::InvalidPredicate { .. }));
    }

    #[test]
    fn unknown_column_fails_on_bind() {
        let pred = Predicate::parse("missing > 1").unwrap();
        let err = pred.bind(&schema()).unwrap_err();
        assert_eq!(err.to_string(), "invalid predicate: name 'missing' is not defined");
    }

    #[test]
    fn non_boolean_result_is_an_error() {
        let r = row("a", 1, None, true);
        assert!(eval("value + 1", &r).is_err());
        assert!(eval("active", &r).unwrap());
    }

    #[test]
    fn backtick_columns() {
        let schema = Schema::new(vec![Field::new("unit price", DataType::Float64)]);
        let pred = Predicate::parse("`unit price` < 2").unwrap();
        assert_eq!(pred.columns(), ["unit price".to_string()]);
        assert!(pred.bind(&schema).unwrap().matches(&[Value::Float64(1.0)]).unwrap());
    }
}
