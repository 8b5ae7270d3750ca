//! SELECT query builder

use std::fmt;
use super::expr::{quote_identifier, Expr};
use super::predicate::Predicate;

/// A single SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    table: String,
    select: Vec<(String, Expr)>,
    filter: Vec<Expr>,
    group_by: Vec<Expr>,
    order_by: Vec<(Expr, bool)>,
    limit: Option<usize>,
}

impl Query {
    /// Start a query over `table`
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: Vec::new(),
            filter: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Add aliased output columns
    pub fn select<S: Into<String>>(mut self, columns: impl IntoIterator<Item = (S, Expr)>) -> Self {
        self.select
            .extend(columns.into_iter().map(|(alias, expr)| (alias.into(), expr)));
        self
    }

    /// AND a predicate into the WHERE clause; empty predicates add nothing
    pub fn filter(mut self, predicate: &Predicate) -> Self {
        if let Some(expr) = predicate.to_expr() {
            self.filter.push(expr);
        }
        self
    }

    /// AND a single expression into the WHERE clause
    pub fn filter_expr(mut self, expr: Expr) -> Self {
        self.filter.push(expr);
        self
    }

    pub fn group_by(mut self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        self.group_by.extend(exprs);
        self
    }

    pub fn order_by(mut self, expr: Expr, descending: bool) -> Self {
        self.order_by.push((expr, descending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Expressions currently in the WHERE clause
    pub fn filters(&self) -> &[Expr] {
        &self.filter
    }

    /// Serialize to the engine's SQL dialect
    pub fn to_sql(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.select.is_empty() {
            f.write_str("*")?;
        }
        for (i, (alias, expr)) in self.select.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match expr {
                Expr::Column(name) if name == alias => write!(f, "{}", expr)?,
                _ => write!(f, "{} AS {}", expr, quote_identifier(alias))?,
            }
        }
        write!(f, " FROM {}", quote_identifier(&self.table))?;

        if !self.filter.is_empty() {
            f.write_str(" WHERE ")?;
            for (i, expr) in self.filter.iter().enumerate() {
                if i > 0 {
                    f.write_str(" AND ")?;
                }
                write!(f, "{}", expr)?;
            }
        }

        if !self.group_by.is_empty() {
            f.write_str(" GROUP BY ")?;
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", expr)?;
            }
        }

        if !self.order_by.is_empty() {
            f.write_str(" ORDER BY ")?;
            for (i, (expr, descending)) in self.order_by.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", expr)?;
                if *descending {
                    f.write_str(" DESC")?;
                }
            }
        }

        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        Ok(())
    }
}
