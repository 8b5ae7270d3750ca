//! Client capability
//!
//! A client is any consumer of coordinated query results: it turns the
//! predicate it is filtered by into a query and receives the resulting rows.

use std::fmt;
use arrow::record_batch::RecordBatch;
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::selection::Selection;
use crate::sql::{Predicate, Query};

/// Stable, comparable client identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    /// A fresh random identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// A fixed identity, handy for reproducible logs
    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// A consumer of coordinated query results
pub trait Client: Send + Sync {
    /// Identity used for clause attribution and cross-filter exclusion
    fn id(&self) -> ClientId;

    /// Selection this client is filtered by, if any
    fn filter_by(&self) -> Option<Selection> {
        None
    }

    /// Build the query for the given filter predicate.
    ///
    /// Must be deterministic and free of side effects; `None` means the
    /// client has nothing to fetch.
    fn query(&self, filter: &Predicate) -> Option<Query>;

    /// Called when a query for this client has been scheduled
    fn query_pending(&self) {}

    /// Receive the rows of the latest query
    fn query_result(&self, data: &RecordBatch) -> Result<()>;

    /// Receive an execution error. Returns `true` when handled, otherwise
    /// the coordinator forwards it to its error sink.
    fn query_error(&self, _error: &Error) -> bool {
        false
    }

    /// Notify downstream consumers that new results are available
    fn update(&self) {}
}
