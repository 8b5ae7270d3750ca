//! Clauses: filter fragments contributed to a selection
//!
//! A [`Clause`] is immutable. Changing a filter means building a new clause
//! and handing it to the selection, which replaces the previous clause from
//! the same source. Clauses built from [`Param`] bounds carry a
//! [`ClauseBinding`] that the owning selection subscribes to, so a param
//! update rebuilds and replaces the clause without the client's involvement.

use std::fmt;
use std::sync::Arc;

use crate::client::ClientId;
use crate::error::{Error, Result};
use crate::param::{Param, ParamValue};
use crate::sql::expr::{and, column, escape_like, or, Expr};
use crate::value::Value;

/// Boundary convention for interval clauses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Boundary {
    /// `lo <= f <= hi`
    #[default]
    Inclusive,
    /// `lo <= f < hi`
    HalfOpen,
}

/// Text matching methods for [`clause_match`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMethod {
    #[default]
    Contains,
    Prefix,
    Suffix,
    Exact,
}

/// Options recognised by the clause helpers
#[derive(Debug, Clone, Default)]
pub struct ClauseOptions {
    /// Client the clause is attributed to
    pub source: Option<ClientId>,
    /// Never filter the source by its own clause, in any selection mode
    pub exclude_source: bool,
    pub boundary: Boundary,
}

impl ClauseOptions {
    pub fn from_source(source: ClientId) -> Self {
        Self { source: Some(source), ..Default::default() }
    }

    pub fn with_exclude_source(mut self, exclude: bool) -> Self {
        self.exclude_source = exclude;
        self
    }

    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }
}

/// The shape and concrete value of a clause
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseValue {
    Interval { low: Value, high: Value, boundary: Boundary },
    Points(Vec<Vec<Value>>),
    Match { text: String, method: MatchMethod },
    Expr(Expr),
    /// Present but contributing no filter
    Cleared,
}

impl ClauseValue {
    /// Build the predicate for `fields`; `None` for a cleared value
    pub fn predicate(&self, fields: &[String]) -> Result<Option<Expr>> {
        match self {
            ClauseValue::Cleared => Ok(None),
            ClauseValue::Expr(expr) => Ok(Some(expr.clone())),
            ClauseValue::Interval { low, high, boundary } => {
                let field = single_field(fields)?;
                let expr = match boundary {
                    Boundary::Inclusive => column(field).between(low.clone(), high.clone()),
                    Boundary::HalfOpen => and([
                        column(field).gte(low.clone()),
                        column(field).lt(high.clone()),
                    ]),
                };
                Ok(Some(expr))
            }
            ClauseValue::Points(tuples) => {
                if tuples.is_empty() {
                    return Ok(Some(Expr::Literal(Value::Boolean(false))));
                }
                if fields.len() == 1 {
                    let values = tuples.iter().map(|t| t[0].clone());
                    return Ok(Some(match tuples.len() {
                        1 => column(&fields[0]).equals(tuples[0][0].clone()),
                        _ => column(&fields[0]).in_list(values),
                    }));
                }
                let terms = tuples.iter().map(|tuple| {
                    and(fields.iter().zip(tuple).map(|(f, v)| column(f).equals(v.clone())))
                });
                Ok(Some(or(terms)))
            }
            ClauseValue::Match { text, method } => {
                let field = single_field(fields)?;
                let escaped = escape_like(text);
                let expr = match method {
                    MatchMethod::Contains => column(field).like(format!("%{}%", escaped)),
                    MatchMethod::Prefix => column(field).like(format!("{}%", escaped)),
                    MatchMethod::Suffix => column(field).like(format!("%{}", escaped)),
                    MatchMethod::Exact => column(field).equals(text.as_str()),
                };
                Ok(Some(expr))
            }
        }
    }
}

fn single_field(fields: &[String]) -> Result<&str> {
    match fields {
        [field] => Ok(field.as_str()),
        _ => Err(Error::InvalidClause(format!(
            "expected exactly one field, got {}",
            fields.len()
        ))),
    }
}

/// One filter fragment contributed to a selection
#[derive(Clone)]
pub struct Clause {
    source: Option<ClientId>,
    fields: Vec<String>,
    value: ClauseValue,
    predicate: Option<Expr>,
    exclude_source: bool,
    binding: Option<Arc<ClauseBinding>>,
}

impl Clause {
    /// Build a clause from its shape, validating it eagerly
    pub fn new(fields: Vec<String>, value: ClauseValue, options: &ClauseOptions) -> Result<Self> {
        let predicate = value.predicate(&fields)?;
        Ok(Self {
            source: options.source,
            fields,
            value,
            predicate,
            exclude_source: options.exclude_source,
            binding: None,
        })
    }

    /// A clause with an arbitrary predicate
    pub fn custom(expr: Expr, options: &ClauseOptions) -> Self {
        Self {
            source: options.source,
            fields: expr.columns(),
            predicate: Some(expr.clone()),
            value: ClauseValue::Expr(expr),
            exclude_source: options.exclude_source,
            binding: None,
        }
    }

    /// A clause that keeps the source's slot but filters nothing
    pub fn cleared(fields: Vec<String>, options: &ClauseOptions) -> Self {
        Self {
            source: options.source,
            fields,
            value: ClauseValue::Cleared,
            predicate: None,
            exclude_source: options.exclude_source,
            binding: None,
        }
    }

    pub fn source(&self) -> Option<ClientId> {
        self.source
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn value(&self) -> &ClauseValue {
        &self.value
    }

    /// The concrete predicate, `None` when cleared
    pub fn predicate(&self) -> Option<&Expr> {
        self.predicate.as_ref()
    }

    pub fn is_cleared(&self) -> bool {
        self.predicate.is_none()
    }

    pub fn excludes_source(&self) -> bool {
        self.exclude_source
    }

    pub fn binding(&self) -> Option<&Arc<ClauseBinding>> {
        self.binding.as_ref()
    }

    /// Whether this clause references `field`
    pub fn references(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

impl fmt::Debug for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clause")
            .field("source", &self.source)
            .field("fields", &self.fields)
            .field("value", &self.value)
            .field("bound", &self.binding.is_some())
            .finish()
    }
}

type ClauseFactory = dyn Fn(&[ParamValue]) -> Result<Clause> + Send + Sync;

/// Rebuilds a clause from the current values of its bound params
pub struct ClauseBinding {
    bounds: Vec<Bound>,
    factory: Box<ClauseFactory>,
}

impl ClauseBinding {
    /// Params this binding depends on
    pub fn params(&self) -> impl Iterator<Item = &Param> {
        self.bounds.iter().filter_map(|b| match b {
            Bound::Param(p) => Some(p),
            Bound::Value(_) => None,
        })
    }

    /// Build a replacement clause from the params' current values
    pub fn rebuild(self: &Arc<Self>) -> Result<Clause> {
        let values = resolve(&self.bounds);
        let mut clause = (self.factory)(&values)?;
        clause.binding = Some(Arc::clone(self));
        Ok(clause)
    }
}

/// A clause input: a literal or a param reference
#[derive(Debug, Clone)]
pub enum Bound {
    Value(Value),
    Param(Param),
}

impl Bound {
    fn current(&self) -> ParamValue {
        match self {
            Bound::Value(v) => ParamValue::Scalar(v.clone()),
            Bound::Param(p) => p.value(),
        }
    }
}

impl From<Param> for Bound {
    fn from(p: Param) -> Self {
        Bound::Param(p)
    }
}

impl From<&Param> for Bound {
    fn from(p: &Param) -> Self {
        Bound::Param(p.clone())
    }
}

impl From<Value> for Bound {
    fn from(v: Value) -> Self {
        Bound::Value(v)
    }
}

macro_rules! impl_literal_bound {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Bound {
                fn from(v: $t) -> Self {
                    Bound::Value(Value::from(v))
                }
            }
        )*
    }
}

impl_literal_bound!(i32, i64, f64, &str, String);

fn resolve(bounds: &[Bound]) -> Vec<ParamValue> {
    bounds.iter().map(Bound::current).collect()
}

fn scalars(values: &[ParamValue]) -> Result<Vec<Value>> {
    values
        .iter()
        .map(|v| match v {
            ParamValue::Scalar(v) => Ok(v.clone()),
            ParamValue::Array(items) => Err(Error::InvalidClause(format!(
                "array of {} values given where a scalar bound is required",
                items.len()
            ))),
        })
        .collect()
}

/// Build a clause from `bounds`, attaching a binding when any bound is a param
fn bind(
    bounds: Vec<Bound>,
    factory: impl Fn(&[ParamValue]) -> Result<Clause> + Send + Sync + 'static,
) -> Result<Clause> {
    let values = resolve(&bounds);
    let mut clause = factory(&values)?;
    if bounds.iter().any(|b| matches!(b, Bound::Param(_))) {
        clause.binding = Some(Arc::new(ClauseBinding {
            bounds,
            factory: Box::new(factory),
        }));
    }
    Ok(clause)
}

/// [`bind`] for builders that only accept scalar bounds
fn bind_scalars(
    bounds: Vec<Bound>,
    factory: impl Fn(&[Value]) -> Result<Clause> + Send + Sync + 'static,
) -> Result<Clause> {
    bind(bounds, move |values| factory(&scalars(values)?))
}

/// Range clause over a numeric field.
///
/// Both bounds `Null` yields a cleared clause. Inverted or degenerate ranges
/// are accepted; they simply match little or nothing.
pub fn clause_interval<B: Into<Bound>>(
    field: impl Into<String>,
    bounds: [B; 2],
    options: ClauseOptions,
) -> Result<Clause> {
    let field = field.into();
    let [lo, hi] = bounds;
    bind_scalars(vec![lo.into(), hi.into()], move |values| {
        let (low, high) = (&values[0], &values[1]);
        if low.is_null() && high.is_null() {
            return Ok(Clause::cleared(vec![field.clone()], &options));
        }
        for bound in [low, high] {
            if !bound.is_numeric() {
                return Err(Error::InvalidClause(format!(
                    "interval bound {} on '{}' is not numeric",
                    bound, field
                )));
            }
        }
        Clause::new(
            vec![field.clone()],
            ClauseValue::Interval {
                low: low.clone(),
                high: high.clone(),
                boundary: options.boundary,
            },
            &options,
        )
    })
}

/// Membership clause over one or more fields.
///
/// `None` yields a cleared clause; an empty list excludes every row.
pub fn clause_points<S: Into<String>>(
    fields: impl IntoIterator<Item = S>,
    tuples: Option<Vec<Vec<Value>>>,
    options: ClauseOptions,
) -> Result<Clause> {
    let fields = points_fields(fields)?;
    let Some(tuples) = tuples else {
        return Ok(Clause::cleared(fields, &options));
    };
    for tuple in &tuples {
        if tuple.len() != fields.len() {
            return Err(Error::ArityMismatch { expected: fields.len(), found: tuple.len() });
        }
    }
    Clause::new(fields, ClauseValue::Points(tuples), &options)
}

/// Membership clause whose tuples come from a param.
///
/// An array value is read as consecutive tuples of `fields.len()` values,
/// so a single-field clause takes one point per element. A scalar value is
/// a single point on a single field, and a `Null` scalar clears the clause.
/// An empty array excludes every row.
pub fn clause_points_param<S: Into<String>>(
    fields: impl IntoIterator<Item = S>,
    tuples: &Param,
    options: ClauseOptions,
) -> Result<Clause> {
    let fields = points_fields(fields)?;
    bind(vec![Bound::from(tuples)], move |values| match &values[0] {
        ParamValue::Scalar(Value::Null) => Ok(Clause::cleared(fields.clone(), &options)),
        ParamValue::Scalar(value) if fields.len() == 1 => Clause::new(
            fields.clone(),
            ClauseValue::Points(vec![vec![value.clone()]]),
            &options,
        ),
        ParamValue::Scalar(_) => Err(Error::ArityMismatch { expected: fields.len(), found: 1 }),
        ParamValue::Array(items) => {
            if items.len() % fields.len() != 0 {
                return Err(Error::ArityMismatch {
                    expected: fields.len(),
                    found: items.len() % fields.len(),
                });
            }
            let tuples = items.chunks(fields.len()).map(<[Value]>::to_vec).collect();
            Clause::new(fields.clone(), ClauseValue::Points(tuples), &options)
        }
    })
}

fn points_fields<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Result<Vec<String>> {
    let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
    if fields.is_empty() {
        return Err(Error::InvalidClause("points clause needs at least one field".into()));
    }
    Ok(fields)
}

/// Equality clause over a single field; a `Null` value clears it
pub fn clause_point(
    field: impl Into<String>,
    value: impl Into<Bound>,
    options: ClauseOptions,
) -> Result<Clause> {
    let field = field.into();
    bind_scalars(vec![value.into()], move |values| {
        if values[0].is_null() {
            return Ok(Clause::cleared(vec![field.clone()], &options));
        }
        Clause::new(
            vec![field.clone()],
            ClauseValue::Points(vec![vec![values[0].clone()]]),
            &options,
        )
    })
}

/// Text matching clause over a single field; empty text clears it.
/// `%` and `_` in the text match themselves, not as wildcards.
pub fn clause_match(
    field: impl Into<String>,
    text: impl Into<Bound>,
    method: MatchMethod,
    options: ClauseOptions,
) -> Result<Clause> {
    let field = field.into();
    bind_scalars(vec![text.into()], move |values| match &values[0] {
        Value::Null => Ok(Clause::cleared(vec![field.clone()], &options)),
        Value::Text(text) if text.is_empty() => Ok(Clause::cleared(vec![field.clone()], &options)),
        Value::Text(text) => Clause::new(
            vec![field.clone()],
            ClauseValue::Match { text: text.clone(), method },
            &options,
        ),
        other => Err(Error::InvalidClause(format!(
            "match text for '{}' must be a string, got {}",
            field, other
        ))),
    })
}
