//! Selections: named compositions of clauses from many clients

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use ahash::AHashMap;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Serialize, Deserialize};

use crate::clause::{Clause, ClauseBinding, ClauseValue};
use crate::client::ClientId;
use crate::param::{ListenerId, Param};
use crate::sql::Predicate;

mod snapshot;
mod subscriber;

pub use snapshot::SelectionSnapshot;
pub use subscriber::SelectionSubscriber;

/// Stable identity of a selection
pub type SelectionId = u64;

static NEXT_SELECTION_ID: AtomicU64 = AtomicU64::new(1);

/// How clauses from different sources are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// AND across sources
    Intersect,
    /// OR across sources
    Union,
    /// Only the most recently updated clause applies
    Single,
    /// AND across sources, never filtering a client by its own clause
    Crossfilter,
}

/// What happened to a selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionChange {
    Updated,
    Removed,
    Reset,
}

/// Notification delivered to selection subscribers
#[derive(Debug, Clone)]
pub struct SelectionEvent {
    pub selection: SelectionId,
    pub source: Option<ClientId>,
    pub change: SelectionChange,
    pub version: u64,
}

#[derive(Default)]
struct SelectionState {
    /// Keyed by source, ordered from least to most recently updated
    clauses: IndexMap<Option<ClientId>, Arc<Clause>>,
    version: u64,
}

/// Param subscriptions held on behalf of one source's clause.
/// Dropping it detaches the listeners.
struct BoundClause {
    binding: Arc<ClauseBinding>,
    listeners: Vec<(Param, ListenerId)>,
}

impl Drop for BoundClause {
    fn drop(&mut self) {
        for (param, id) in &self.listeners {
            param.unsubscribe(*id);
        }
    }
}

struct SelectionInner {
    id: SelectionId,
    name: String,
    mode: SelectionMode,
    state: RwLock<SelectionState>,
    bindings: Mutex<AHashMap<Option<ClientId>, BoundClause>>,
    subscribers: RwLock<Vec<Weak<dyn SelectionSubscriber>>>,
}

/// A shared, named set of clauses. Cloning yields another handle.
#[derive(Clone)]
pub struct Selection {
    inner: Arc<SelectionInner>,
}

impl Selection {
    /// Create a selection with a generated name
    pub fn new(mode: SelectionMode) -> Self {
        let id = NEXT_SELECTION_ID.fetch_add(1, Ordering::Relaxed);
        Self::build(id, format!("selection-{}", id), mode)
    }

    pub fn named(name: impl Into<String>, mode: SelectionMode) -> Self {
        let id = NEXT_SELECTION_ID.fetch_add(1, Ordering::Relaxed);
        Self::build(id, name.into(), mode)
    }

    fn build(id: SelectionId, name: String, mode: SelectionMode) -> Self {
        Self {
            inner: Arc::new(SelectionInner {
                id,
                name,
                mode,
                state: RwLock::new(SelectionState::default()),
                bindings: Mutex::new(AHashMap::new()),
                subscribers: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn intersect() -> Self {
        Self::new(SelectionMode::Intersect)
    }

    pub fn union() -> Self {
        Self::new(SelectionMode::Union)
    }

    pub fn single() -> Self {
        Self::new(SelectionMode::Single)
    }

    pub fn crossfilter() -> Self {
        Self::new(SelectionMode::Crossfilter)
    }

    pub fn id(&self) -> SelectionId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn mode(&self) -> SelectionMode {
        self.inner.mode
    }

    pub fn version(&self) -> u64 {
        self.inner.state.read().version
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &Selection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Store `clause`, superseding any previous clause from the same source
    pub fn update(&self, clause: Clause) {
        let key = clause.source();
        let clause = Arc::new(clause);
        let version = {
            let mut state = self.inner.state.write();
            if self.inner.mode == SelectionMode::Single {
                state.clauses.clear();
            } else {
                state.clauses.shift_remove(&key);
            }
            state.clauses.insert(key, Arc::clone(&clause));
            state.version += 1;
            state.version
        };

        tracing::debug!(
            "Selection '{}' v{}: clause from {} -> {}",
            self.inner.name,
            version,
            source_label(key),
            clause.predicate().map(|p| p.to_sql()).unwrap_or_else(|| "<cleared>".into())
        );

        self.rebind(key, &clause);
        self.notify_subscribers(SelectionEvent {
            selection: self.inner.id,
            source: key,
            change: SelectionChange::Updated,
            version,
        });
    }

    /// Remove the clause contributed by `source`. Returns whether one existed.
    pub fn remove(&self, source: Option<ClientId>) -> bool {
        let version = {
            let mut state = self.inner.state.write();
            if state.clauses.shift_remove(&source).is_none() {
                return false;
            }
            state.version += 1;
            state.version
        };
        self.inner.bindings.lock().remove(&source);
        self.notify_subscribers(SelectionEvent {
            selection: self.inner.id,
            source,
            change: SelectionChange::Removed,
            version,
        });
        true
    }

    /// Remove every clause
    pub fn reset(&self) {
        let version = {
            let mut state = self.inner.state.write();
            if state.clauses.is_empty() {
                return;
            }
            state.clauses.clear();
            state.version += 1;
            state.version
        };
        self.inner.bindings.lock().clear();
        self.notify_subscribers(SelectionEvent {
            selection: self.inner.id,
            source: None,
            change: SelectionChange::Reset,
            version,
        });
    }

    /// Consistent copy of the current clauses
    pub fn snapshot(&self) -> SelectionSnapshot {
        let state = self.inner.state.read();
        SelectionSnapshot {
            mode: self.inner.mode,
            version: state.version,
            clauses: state.clauses.values().cloned().collect(),
        }
    }

    /// The predicate that should filter `client`'s query
    pub fn predicate(&self, client: impl Into<Option<ClientId>>) -> Predicate {
        self.snapshot().predicate(client)
    }

    /// Clauses ordered from least to most recently updated
    pub fn clauses(&self) -> Vec<Arc<Clause>> {
        self.inner.state.read().clauses.values().cloned().collect()
    }

    /// The clause contributed by `source`
    pub fn clause(&self, source: Option<ClientId>) -> Option<Arc<Clause>> {
        self.inner.state.read().clauses.get(&source).cloned()
    }

    /// The most recently updated clause
    pub fn active(&self) -> Option<Arc<Clause>> {
        self.inner.state.read().clauses.values().last().cloned()
    }

    /// Value of the most recently updated clause
    pub fn value(&self) -> Option<ClauseValue> {
        self.active().map(|c| c.value().clone())
    }

    /// Add a subscriber; it is held weakly
    pub fn add_subscriber(&self, subscriber: Arc<dyn SelectionSubscriber>) {
        self.inner.subscribers.write().push(Arc::downgrade(&subscriber));
    }

    /// Remove a subscriber previously added
    pub fn remove_subscriber(&self, subscriber: &Arc<dyn SelectionSubscriber>) {
        let target = Arc::as_ptr(subscriber) as *const ();
        self.inner
            .subscribers
            .write()
            .retain(|weak| match weak.upgrade() {
                Some(live) => Arc::as_ptr(&live) as *const () != target,
                None => false,
            });
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Keep param subscriptions in step with the clause stored for `key`
    fn rebind(&self, key: Option<ClientId>, clause: &Arc<Clause>) {
        let mut bindings = self.inner.bindings.lock();
        if self.inner.mode == SelectionMode::Single {
            bindings.retain(|k, _| *k == key);
        }

        let Some(binding) = clause.binding() else {
            bindings.remove(&key);
            return;
        };

        if let Some(existing) = bindings.get(&key) {
            if Arc::ptr_eq(&existing.binding, binding) {
                return;
            }
        }

        let mut listeners = Vec::new();
        for param in binding.params() {
            let weak = Arc::downgrade(&self.inner);
            let binding = Arc::clone(binding);
            let id = param.subscribe(move |_| {
                let Some(inner) = weak.upgrade() else {
                    return Ok(());
                };
                let clause = binding.rebuild()?;
                Selection { inner }.update(clause);
                Ok(())
            });
            listeners.push((param.clone(), id));
        }

        bindings.insert(key, BoundClause { binding: Arc::clone(binding), listeners });
    }

    /// Notify all subscribers of a selection change
    fn notify_subscribers(&self, event: SelectionEvent) {
        let live: Vec<Arc<dyn SelectionSubscriber>> = {
            let mut subscribers = self.inner.subscribers.write();

            // Remove any dead weak references
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(|weak| weak.upgrade()).collect()
        };

        for subscriber in live {
            subscriber.on_selection_change(&event);
        }
    }
}

fn source_label(source: Option<ClientId>) -> String {
    source.map(|s| s.to_string()).unwrap_or_else(|| "<anonymous>".into())
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("mode", &self.inner.mode)
            .field("clauses", &self.len())
            .finish()
    }
}
