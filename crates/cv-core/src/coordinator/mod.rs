//! Coordinator: client registration, change propagation and query scheduling
//!
//! Selection changes only mark clients pending. A scheduler task drains the
//! pending set in registration order. After a wakeup it yields and then
//! waits out the configured coalescing window before draining, so changes
//! that land within that window collapse into one execution per client on
//! any runtime flavor. Every request is tagged with a generation drawn from
//! one coordinator-wide counter; results whose generation is no longer the
//! client's current one are dropped instead of delivered, including results
//! left over from an earlier connection of the same client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use ahash::AHashMap;
use arrow::record_batch::RecordBatch;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::client::{Client, ClientId};
use crate::connector::Connector;
use crate::error::{Error, Result};
use crate::selection::{Selection, SelectionEvent, SelectionId, SelectionSnapshot, SelectionSubscriber};
use crate::sql::{Predicate, Query};

mod cache;
mod config;

pub use cache::{CacheStats, QueryCache};
pub use config::CoordinatorConfig;

/// Process-wide sink for execution errors no client handled
pub type ErrorSink = Arc<dyn Fn(ClientId, &Error) + Send + Sync>;

/// Query lifecycle of one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Pending,
    Executing,
}

struct ClientEntry {
    client: Arc<dyn Client>,
    selection: Option<Selection>,
    generation: u64,
    status: QueryStatus,
    /// Serializes result delivery for this client
    delivery: Arc<Mutex<()>>,
}

#[derive(Default)]
struct CoordinatorState {
    /// Registration order
    clients: IndexMap<ClientId, ClientEntry>,
    /// Observed selections with the number of clients filtered by each
    selections: AHashMap<SelectionId, (Selection, usize)>,
    shutdown: bool,
}

/// One generation-tagged execution for one client
struct QueryRequest {
    client: Arc<dyn Client>,
    generation: u64,
    predicate: Predicate,
    delivery: Arc<Mutex<()>>,
}

struct CoordinatorInner {
    connector: Arc<dyn Connector>,
    config: CoordinatorConfig,
    state: Mutex<CoordinatorState>,
    /// Source of request generations, never reused
    next_generation: AtomicU64,
    cache: QueryCache,
    /// Reads share it, statements take it exclusively
    statement_lock: tokio::sync::RwLock<()>,
    wakeup: Arc<Notify>,
    idle: Notify,
    error_sink: RwLock<ErrorSink>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

/// Runtime that owns the data engine connection and drives client queries.
/// Cloning yields another handle to the same coordinator.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    /// Create a coordinator and spawn its scheduler on the current tokio runtime.
    ///
    /// Works on both the current-thread and multi-thread runtimes. Changes
    /// arriving within `coalesce_window_ms` of the first pending change are
    /// answered by a single execution per dependent client.
    pub fn start(connector: Arc<dyn Connector>, config: CoordinatorConfig) -> Self {
        let default_sink: ErrorSink = Arc::new(|client, error| {
            tracing::error!("Query for client {} failed: {}", client, error);
        });

        let inner = Arc::new(CoordinatorInner {
            connector,
            cache: QueryCache::new(config.cache_capacity),
            config,
            state: Mutex::new(CoordinatorState::default()),
            next_generation: AtomicU64::new(1),
            statement_lock: tokio::sync::RwLock::new(()),
            wakeup: Arc::new(Notify::new()),
            idle: Notify::new(),
            error_sink: RwLock::new(default_sink),
            scheduler: Mutex::new(None),
        });

        let window = Duration::from_millis(inner.config.coalesce_window_ms);
        let handle = tokio::spawn(run_scheduler(
            Arc::downgrade(&inner),
            Arc::clone(&inner.wakeup),
            window,
        ));
        *inner.scheduler.lock() = Some(handle);

        tracing::info!("Coordinator started on {}", inner.connector.name());
        Self { inner }
    }

    /// Replace the sink that receives unhandled execution errors
    pub fn set_error_sink(&self, sink: impl Fn(ClientId, &Error) + Send + Sync + 'static) {
        *self.inner.error_sink.write() = Arc::new(sink);
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Register `client` and deliver its first result.
    ///
    /// Resolves once the initial query has been delivered or reported as
    /// failed through the client's error channel.
    pub async fn connect(&self, client: Arc<dyn Client>) -> Result<()> {
        let id = client.id();
        let selection = client.filter_by();

        let request = {
            let mut state = self.inner.state.lock();
            if state.shutdown {
                return Err(Error::Shutdown);
            }
            if state.clients.contains_key(&id) {
                return Err(Error::AlreadyConnected(id));
            }

            if let Some(selection) = &selection {
                let observed = state
                    .selections
                    .entry(selection.id())
                    .or_insert_with(|| (selection.clone(), 0));
                if observed.1 == 0 {
                    selection.add_subscriber(self.inner.clone() as Arc<dyn SelectionSubscriber>);
                }
                observed.1 += 1;
            }

            let delivery = Arc::new(Mutex::new(()));
            let generation = self.inner.fresh_generation();
            state.clients.insert(
                id,
                ClientEntry {
                    client: Arc::clone(&client),
                    selection: selection.clone(),
                    generation,
                    status: QueryStatus::Executing,
                    delivery: Arc::clone(&delivery),
                },
            );

            QueryRequest {
                client: Arc::clone(&client),
                generation,
                predicate: selection.as_ref().map(|s| s.predicate(id)).unwrap_or_default(),
                delivery,
            }
        };

        tracing::info!(
            "Connected client {}{}",
            id,
            selection.map(|s| format!(" filtered by '{}'", s.name())).unwrap_or_default()
        );

        client.query_pending();
        Arc::clone(&self.inner).execute(request).await;
        Ok(())
    }

    /// Stop scheduling `id`. An outstanding execution may finish but its
    /// result is dropped.
    pub fn disconnect(&self, id: ClientId) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            let entry = state.clients.shift_remove(&id).ok_or(Error::NotConnected(id))?;
            if let Some(selection) = entry.selection {
                self.inner.release_selection(&mut state, &selection);
            }
        }
        tracing::info!("Disconnected client {}", id);
        self.inner.signal_if_idle();
        Ok(())
    }

    /// Mark a connected client pending, e.g. after its own query inputs changed
    pub fn request_query(&self, id: ClientId) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            let entry = state.clients.get_mut(&id).ok_or(Error::NotConnected(id))?;
            mark_pending(entry, &self.inner.next_generation);
        }
        self.inner.wakeup.notify_one();
        Ok(())
    }

    /// Execute a statement that returns no rows. Statements never overlap
    /// with each other or with reads; the result cache is cleared afterwards.
    pub async fn exec(&self, sql: &str) -> Result<()> {
        let _exclusive = self.inner.statement_lock.write().await;
        if self.inner.config.log_queries {
            tracing::debug!("Exec: {}", sql);
        }
        self.inner.connector.exec(sql).await?;
        self.inner.cache.clear();
        Ok(())
    }

    /// Run a one-off read through the cache
    pub async fn query(&self, query: &Query) -> Result<RecordBatch> {
        self.inner.run_query(&query.to_sql()).await
    }

    /// Warm the cache for `query` without delivering it anywhere
    pub async fn prefetch(&self, query: &Query) -> Result<()> {
        self.inner.run_query(&query.to_sql()).await.map(|_| ())
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Connected clients in registration order
    pub fn clients(&self) -> Vec<ClientId> {
        self.inner.state.lock().clients.keys().copied().collect()
    }

    pub fn status(&self, id: ClientId) -> Option<QueryStatus> {
        self.inner.state.lock().clients.get(&id).map(|e| e.status)
    }

    /// Latest generation requested for `id`
    pub fn generation(&self, id: ClientId) -> Option<u64> {
        self.inner.state.lock().clients.get(&id).map(|e| e.generation)
    }

    /// Resolve once no client is pending or executing
    pub async fn pending(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Stop the scheduler and disconnect every client
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.clients.clear();
            let subscriber = self.inner.clone() as Arc<dyn SelectionSubscriber>;
            for (_, (selection, _)) in state.selections.drain() {
                selection.remove_subscriber(&subscriber);
            }
        }

        self.inner.wakeup.notify_one();
        let handle = self.inner.scheduler.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Scheduler task ended abnormally: {}", e);
            }
        }
        self.inner.signal_if_idle();
        tracing::info!("Coordinator shut down");
    }
}

/// Move to a fresh generation unless a newer request is already waiting
fn mark_pending(entry: &mut ClientEntry, counter: &AtomicU64) -> bool {
    if entry.status == QueryStatus::Pending {
        return false;
    }
    entry.generation = counter.fetch_add(1, Ordering::Relaxed);
    entry.status = QueryStatus::Pending;
    true
}

async fn run_scheduler(inner: Weak<CoordinatorInner>, wakeup: Arc<Notify>, window: Duration) {
    loop {
        wakeup.notified().await;
        // Let the task that triggered the wakeup finish its burst of changes
        tokio::task::yield_now().await;
        if !window.is_zero() {
            tokio::time::sleep(window).await;
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.state.lock().shutdown {
            break;
        }
        inner.dispatch_pending();
    }
    tracing::debug!("Scheduler stopped");
}

impl CoordinatorInner {
    fn fresh_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Start one execution per pending client, in registration order
    fn dispatch_pending(self: &Arc<Self>) {
        let requests: Vec<QueryRequest> = {
            let mut state = self.state.lock();
            let mut snapshots: AHashMap<SelectionId, SelectionSnapshot> = AHashMap::new();
            let mut requests = Vec::new();

            for (id, entry) in state.clients.iter_mut() {
                if entry.status != QueryStatus::Pending {
                    continue;
                }
                let predicate = match &entry.selection {
                    Some(selection) => snapshots
                        .entry(selection.id())
                        .or_insert_with(|| selection.snapshot())
                        .predicate(*id),
                    None => Predicate::empty(),
                };
                entry.status = QueryStatus::Executing;
                requests.push(QueryRequest {
                    client: Arc::clone(&entry.client),
                    generation: entry.generation,
                    predicate,
                    delivery: Arc::clone(&entry.delivery),
                });
            }
            requests
        };

        if requests.is_empty() {
            return;
        }
        tracing::debug!("Scheduling {} client queries", requests.len());

        for request in requests {
            request.client.query_pending();
            tokio::spawn(Arc::clone(self).execute(request));
        }
    }

    async fn execute(self: Arc<Self>, request: QueryRequest) {
        let result = match request.client.query(&request.predicate) {
            Some(query) => Some(self.run_query(&query.to_sql()).await),
            None => None,
        };
        self.deliver(request, result);
    }

    async fn run_query(&self, sql: &str) -> Result<RecordBatch> {
        let _shared = self.statement_lock.read().await;
        if self.config.log_queries {
            tracing::debug!("Query: {}", sql);
        }
        if !self.config.cache_enabled {
            return self.connector.query(sql).await;
        }
        self.cache
            .get_or_execute(sql, || self.connector.query(sql))
            .await
    }

    fn is_current(&self, id: ClientId, generation: u64) -> bool {
        self.state
            .lock()
            .clients
            .get(&id)
            .map_or(false, |e| e.generation == generation)
    }

    fn deliver(&self, request: QueryRequest, result: Option<Result<RecordBatch>>) {
        let client = &request.client;
        let id = client.id();
        {
            let _delivery = request.delivery.lock();
            if !self.is_current(id, request.generation) {
                tracing::debug!(
                    "Dropping stale result for client {} (generation {})",
                    id,
                    request.generation
                );
            } else {
                match result {
                    Some(Ok(batch)) => match client.query_result(&batch) {
                        Ok(()) => client.update(),
                        Err(e) => self.report_error(client.as_ref(), e),
                    },
                    Some(Err(e)) => self.report_error(client.as_ref(), e),
                    None => {}
                }
            }

            let mut state = self.state.lock();
            if let Some(entry) = state.clients.get_mut(&id) {
                if entry.generation == request.generation && entry.status == QueryStatus::Executing {
                    entry.status = QueryStatus::Idle;
                }
            }
        }
        self.signal_if_idle();
    }

    fn report_error(&self, client: &dyn Client, error: Error) {
        if !client.query_error(&error) {
            let sink = self.error_sink.read().clone();
            sink(client.id(), &error);
        }
    }

    fn release_selection(self: &Arc<Self>, state: &mut CoordinatorState, selection: &Selection) {
        let remaining = match state.selections.get_mut(&selection.id()) {
            Some(observed) => {
                observed.1 -= 1;
                observed.1
            }
            None => return,
        };
        if remaining == 0 {
            state.selections.remove(&selection.id());
            let subscriber = Arc::clone(self) as Arc<dyn SelectionSubscriber>;
            selection.remove_subscriber(&subscriber);
        }
    }

    fn is_idle(&self) -> bool {
        self.state
            .lock()
            .clients
            .values()
            .all(|e| e.status == QueryStatus::Idle)
    }

    fn signal_if_idle(&self) {
        if self.is_idle() {
            self.idle.notify_waiters();
        }
    }
}

impl SelectionSubscriber for CoordinatorInner {
    fn on_selection_change(&self, event: &SelectionEvent) {
        let marked = {
            let mut state = self.state.lock();
            let mut marked = 0;
            for entry in state.clients.values_mut() {
                let observes = entry
                    .selection
                    .as_ref()
                    .map_or(false, |s| s.id() == event.selection);
                if observes && mark_pending(entry, &self.next_generation) {
                    marked += 1;
                }
            }
            marked
        };

        if marked > 0 {
            tracing::debug!(
                "Selection {} v{} changed: {} client(s) pending",
                event.selection,
                event.version,
                marked
            );
            self.wakeup.notify_one();
        }
    }
}

impl Drop for CoordinatorInner {
    fn drop(&mut self) {
        // Let a parked scheduler observe the dropped coordinator and exit
        self.wakeup.notify_one();
    }
}
