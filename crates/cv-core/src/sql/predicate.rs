//! Composed filter predicates handed to clients

use std::fmt;
use super::expr::Expr;

/// How the terms of a predicate are joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    All,
    Any,
}

/// A filter predicate made of independent terms.
///
/// An empty predicate filters nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    conjunction: Conjunction,
    terms: Vec<Expr>,
}

impl Predicate {
    /// The always-true predicate
    pub fn empty() -> Self {
        Self { conjunction: Conjunction::All, terms: Vec::new() }
    }

    /// Every term must hold
    pub fn all(terms: impl IntoIterator<Item = Expr>) -> Self {
        Self { conjunction: Conjunction::All, terms: terms.into_iter().collect() }
    }

    /// At least one term must hold
    pub fn any(terms: impl IntoIterator<Item = Expr>) -> Self {
        Self { conjunction: Conjunction::Any, terms: terms.into_iter().collect() }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn conjunction(&self) -> Conjunction {
        self.conjunction
    }

    pub fn terms(&self) -> &[Expr] {
        &self.terms
    }

    /// Whether `term` is one of the combined terms
    pub fn contains(&self, term: &Expr) -> bool {
        self.terms.iter().any(|t| t == term)
    }

    /// Collapse into a single expression, `None` when empty
    pub fn to_expr(&self) -> Option<Expr> {
        match self.terms.len() {
            0 => None,
            1 => Some(self.terms[0].clone()),
            _ => Some(match self.conjunction {
                Conjunction::All => Expr::And(self.terms.clone()),
                Conjunction::Any => Expr::Or(self.terms.clone()),
            }),
        }
    }

    /// SQL text for a WHERE clause, `None` when empty
    pub fn to_sql(&self) -> Option<String> {
        self.to_expr().map(|e| e.to_sql())
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Expr> for Predicate {
    fn from(expr: Expr) -> Self {
        Predicate::all([expr])
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_expr() {
            Some(expr) => write!(f, "{}", expr),
            None => Ok(()),
        }
    }
}
