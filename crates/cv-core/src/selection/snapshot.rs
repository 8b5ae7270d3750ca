//! Per-client predicate composition

use std::sync::Arc;

use crate::clause::Clause;
use crate::client::ClientId;
use crate::sql::Predicate;
use super::SelectionMode;

/// An immutable view of a selection's clauses at one version.
///
/// Predicates for many clients computed from the same snapshot are
/// consistent with each other even if the selection changes meanwhile.
#[derive(Debug, Clone)]
pub struct SelectionSnapshot {
    pub(crate) mode: SelectionMode,
    pub(crate) version: u64,
    /// Ordered from least to most recently updated
    pub(crate) clauses: Vec<Arc<Clause>>,
}

impl SelectionSnapshot {
    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn clauses(&self) -> &[Arc<Clause>] {
        &self.clauses
    }

    /// Whether `clause` must be left out of the predicate for `client`
    fn skips(&self, clause: &Clause, client: Option<ClientId>) -> bool {
        match (client, clause.source()) {
            (Some(client), Some(source)) if client == source => {
                self.mode == SelectionMode::Crossfilter || clause.excludes_source()
            }
            _ => false,
        }
    }

    /// The predicate that should filter `client`'s query.
    ///
    /// Clauses from different sources are never merged, even when they
    /// reference the same field.
    pub fn predicate(&self, client: impl Into<Option<ClientId>>) -> Predicate {
        let client = client.into();
        let mut remaining: Vec<&Arc<Clause>> = self
            .clauses
            .iter()
            .filter(|clause| !self.skips(clause, client))
            .collect();

        if self.mode == SelectionMode::Single && remaining.len() > 1 {
            remaining.drain(..remaining.len() - 1);
        }

        let terms = remaining
            .into_iter()
            .filter_map(|clause| clause.predicate().cloned());

        match self.mode {
            SelectionMode::Union => Predicate::any(terms),
            _ => Predicate::all(terms),
        }
    }
}
