//! SQL query model shared by clients, selections and the coordinator

pub mod expr;
pub mod predicate;
pub mod query;

pub use expr::{
    and, avg, column, count, escape_like, literal, max, min, not, or, quote_identifier, sum,
    AggregateFunc, BinaryOp, Expr,
};
pub use predicate::{Conjunction, Predicate};
pub use query::Query;
