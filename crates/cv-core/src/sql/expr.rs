//! Structured SQL expressions
//!
//! Expressions stay structured until the coordinator hands a query to the
//! connector, so predicates can be embedded into other queries without
//! re-parsing.

use std::fmt;
use crate::value::Value;

/// Comparison and matching operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
}

impl BinaryOp {
    fn as_sql(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Like => "LIKE",
        }
    }
}

/// Aggregate functions usable in client queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    fn as_sql(&self) -> &'static str {
        match self {
            AggregateFunc::Count => "count",
            AggregateFunc::Sum => "sum",
            AggregateFunc::Avg => "avg",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
        }
    }
}

/// A SQL expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Value),
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Expr {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(Expr::Literal(low.into())),
            high: Box::new(Expr::Literal(high.into())),
        }
    }

    pub fn binary(self, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn equals(self, value: impl Into<Value>) -> Expr {
        self.binary(BinaryOp::Eq, Expr::Literal(value.into()))
    }

    pub fn gte(self, value: impl Into<Value>) -> Expr {
        self.binary(BinaryOp::GtEq, Expr::Literal(value.into()))
    }

    pub fn lt(self, value: impl Into<Value>) -> Expr {
        self.binary(BinaryOp::Lt, Expr::Literal(value.into()))
    }

    /// `LIKE` with `\` as the escape character; see [`escape_like`]
    pub fn like(self, pattern: impl Into<String>) -> Expr {
        self.binary(BinaryOp::Like, Expr::Literal(Value::Text(pattern.into())))
    }

    pub fn in_list(self, values: impl IntoIterator<Item = Value>) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            list: values.into_iter().map(Expr::Literal).collect(),
        }
    }

    /// Names of every column referenced by this expression
    pub fn columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<String>) {
        match self {
            Expr::Column(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Literal(_) => {}
            Expr::Between { expr, low, high } => {
                expr.collect_columns(out);
                low.collect_columns(out);
                high.collect_columns(out);
            }
            Expr::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::InList { expr, list } => {
                expr.collect_columns(out);
                for item in list {
                    item.collect_columns(out);
                }
            }
            Expr::And(terms) | Expr::Or(terms) => {
                for term in terms {
                    term.collect_columns(out);
                }
            }
            Expr::Not(inner) => inner.collect_columns(out),
            Expr::Aggregate { arg, .. } => {
                if let Some(arg) = arg {
                    arg.collect_columns(out);
                }
            }
        }
    }

    pub fn to_sql(&self) -> String {
        self.to_string()
    }
}

/// Column reference
pub fn column(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// Literal value
pub fn literal(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

/// Conjunction of terms; a single term is returned unwrapped
pub fn and(terms: impl IntoIterator<Item = Expr>) -> Expr {
    let mut terms: Vec<Expr> = terms.into_iter().collect();
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        Expr::And(terms)
    }
}

/// Disjunction of terms; a single term is returned unwrapped
pub fn or(terms: impl IntoIterator<Item = Expr>) -> Expr {
    let mut terms: Vec<Expr> = terms.into_iter().collect();
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        Expr::Or(terms)
    }
}

pub fn not(expr: Expr) -> Expr {
    Expr::Not(Box::new(expr))
}

pub fn count() -> Expr {
    Expr::Aggregate { func: AggregateFunc::Count, arg: None }
}

pub fn sum(expr: Expr) -> Expr {
    Expr::Aggregate { func: AggregateFunc::Sum, arg: Some(Box::new(expr)) }
}

pub fn avg(expr: Expr) -> Expr {
    Expr::Aggregate { func: AggregateFunc::Avg, arg: Some(Box::new(expr)) }
}

pub fn min(expr: Expr) -> Expr {
    Expr::Aggregate { func: AggregateFunc::Min, arg: Some(Box::new(expr)) }
}

pub fn max(expr: Expr) -> Expr {
    Expr::Aggregate { func: AggregateFunc::Max, arg: Some(Box::new(expr)) }
}

/// Escape `%`, `_` and `\` so `text` matches literally inside a LIKE pattern
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Quote an identifier for SQL
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn write_joined(f: &mut fmt::Formatter<'_>, terms: &[Expr], sep: &str, empty: &str) -> fmt::Result {
    match terms.len() {
        0 => f.write_str(empty),
        1 => write!(f, "{}", terms[0]),
        _ => {
            f.write_str("(")?;
            for (i, term) in terms.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{}", term)?;
            }
            f.write_str(")")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => f.write_str(&quote_identifier(name)),
            Expr::Literal(value) => f.write_str(&value.to_sql()),
            Expr::Between { expr, low, high } => {
                write!(f, "({} BETWEEN {} AND {})", expr, low, high)
            }
            Expr::Binary { op: BinaryOp::Like, left, right } => {
                write!(f, "({} LIKE {} ESCAPE '\\')", left, right)
            }
            Expr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.as_sql(), right)
            }
            Expr::InList { expr, list } => {
                write!(f, "({} IN (", expr)?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("))")
            }
            Expr::And(terms) => write_joined(f, terms, " AND ", "TRUE"),
            Expr::Or(terms) => write_joined(f, terms, " OR ", "FALSE"),
            Expr::Not(inner) => write!(f, "(NOT {})", inner),
            Expr::Aggregate { func, arg } => match arg {
                Some(arg) => write!(f, "{}({})", func.as_sql(), arg),
                None => write!(f, "{}(*)", func.as_sql()),
            },
        }
    }
}
