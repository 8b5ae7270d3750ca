//! Core of the cross-filter coordination engine
//!
//! Clients describe the rows they need as SQL queries over a shared table.
//! Interactions publish clauses into selections; the coordinator turns each
//! selection change into fresh, per-client filtered queries and delivers
//! the latest results back.

pub mod clause;
pub mod client;
pub mod connector;
pub mod coordinator;
pub mod error;
pub mod param;
pub mod selection;
pub mod sql;
pub mod value;

// Re-export commonly used types
pub use clause::{
    clause_interval, clause_match, clause_point, clause_points, clause_points_param, Bound,
    Boundary, Clause, ClauseOptions, ClauseValue, MatchMethod,
};
pub use client::{Client, ClientId};
pub use connector::Connector;
pub use coordinator::{CacheStats, Coordinator, CoordinatorConfig, QueryStatus};
pub use error::{Error, Result};
pub use param::{Param, ParamValue};
pub use selection::{
    Selection, SelectionChange, SelectionEvent, SelectionMode, SelectionSnapshot,
    SelectionSubscriber,
};
pub use sql::{Predicate, Query};
pub use value::Value;
