use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arrow::array::{Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use cv_core::sql::{column, count};
use cv_core::{
    clause_interval, clause_point, Bound, Client, ClientId, ClauseOptions, Connector,
    Coordinator, CoordinatorConfig, Error, Param, Predicate, Query, QueryStatus, Result,
    Selection,
};

/// Connector that echoes each query's SQL back as a one-row batch
#[derive(Default)]
struct ScriptedConnector {
    queries: Mutex<Vec<String>>,
    statements: Mutex<Vec<String>>,
    gates: Mutex<Vec<(String, Arc<Semaphore>)>>,
    failures: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    /// Park every query containing `pattern` until `release` is called
    fn hold(&self, pattern: &str) {
        self.gates.lock().push((pattern.to_string(), Arc::new(Semaphore::new(0))));
    }

    fn release(&self, pattern: &str) {
        for (p, gate) in self.gates.lock().iter() {
            if p == pattern {
                gate.add_permits(1000);
            }
        }
    }

    fn fail_on(&self, pattern: &str) {
        self.failures.lock().push(pattern.to_string());
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    fn calls_matching(&self, pattern: &str) -> usize {
        self.queries.lock().iter().filter(|sql| sql.contains(pattern)).count()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn exec(&self, sql: &str) -> Result<()> {
        self.statements.lock().push(sql.to_string());
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<RecordBatch> {
        self.queries.lock().push(sql.to_string());

        let gate = self
            .gates
            .lock()
            .iter()
            .find(|(p, _)| sql.contains(p.as_str()))
            .map(|(_, g)| Arc::clone(g));
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if self.failures.lock().iter().any(|p| sql.contains(p.as_str())) {
            return Err(Error::Connector(format!("cannot run {}", sql)));
        }

        let schema = Arc::new(Schema::new(vec![Field::new("sql", DataType::Utf8, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(StringArray::from(vec![sql]))])
            .map_err(|e| Error::Connector(e.to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Histogram-style client recording everything it receives
struct RecordingClient {
    id: ClientId,
    field: String,
    selection: Option<Selection>,
    handles_errors: bool,
    results: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    pending_calls: AtomicUsize,
    updates: AtomicUsize,
}

impl RecordingClient {
    fn new(field: &str, selection: Option<&Selection>) -> Arc<Self> {
        Arc::new(Self {
            id: ClientId::new(),
            field: field.to_string(),
            selection: selection.cloned(),
            handles_errors: false,
            results: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            pending_calls: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        })
    }

    fn handling_errors(field: &str, selection: Option<&Selection>) -> Arc<Self> {
        let mut client = Arc::into_inner(Self::new(field, selection)).unwrap();
        client.handles_errors = true;
        Arc::new(client)
    }

    fn results(&self) -> Vec<String> {
        self.results.lock().clone()
    }

    fn last_result(&self) -> String {
        self.results.lock().last().cloned().unwrap_or_default()
    }
}

impl Client for RecordingClient {
    fn id(&self) -> ClientId {
        self.id
    }

    fn filter_by(&self) -> Option<Selection> {
        self.selection.clone()
    }

    fn query(&self, filter: &Predicate) -> Option<Query> {
        if self.field.is_empty() {
            return None;
        }
        Some(
            Query::table("trips")
                .select([("key", column(&self.field)), ("value", count())])
                .filter(filter)
                .group_by([column(&self.field)]),
        )
    }

    fn query_pending(&self) {
        self.pending_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn query_result(&self, data: &RecordBatch) -> Result<()> {
        let sql = data
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| Error::Client("expected a string column".into()))?;
        self.results.lock().push(sql.value(0).to_string());
        Ok(())
    }

    fn query_error(&self, error: &Error) -> bool {
        self.errors.lock().push(error.to_string());
        self.handles_errors
    }

    fn update(&self) {
        self.updates.fetch_add(1, Ordering::SeqCst);
    }
}

fn setup() -> (Arc<ScriptedConnector>, Coordinator) {
    let connector = Arc::new(ScriptedConnector::default());
    let coordinator = Coordinator::start(connector.clone(), CoordinatorConfig::default());
    (connector, coordinator)
}

/// Let spawned tasks on the test runtime run to their next suspension point
async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}

async fn wait_for_calls(connector: &ScriptedConnector, pattern: &str, expected: usize) {
    for _ in 0..1000 {
        if connector.calls_matching(pattern) >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("connector never saw {} call(s) matching {:?}", expected, pattern);
}

#[tokio::test]
async fn test_connect_delivers_initial_result() {
    let (connector, coordinator) = setup();
    let client = RecordingClient::new("HourOfDay", None);

    coordinator.connect(client.clone()).await.unwrap();

    assert_eq!(
        client.results(),
        vec![r#"SELECT "HourOfDay" AS "key", count(*) AS "value" FROM "trips" GROUP BY "HourOfDay""#]
    );
    assert_eq!(client.pending_calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.updates.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.status(client.id), Some(QueryStatus::Idle));
    assert!(coordinator.generation(client.id).is_some());
    assert_eq!(connector.queries().len(), 1);
}

#[tokio::test]
async fn test_connect_rejects_duplicates() {
    let (_connector, coordinator) = setup();
    let client = RecordingClient::new("HourOfDay", None);

    coordinator.connect(client.clone()).await.unwrap();
    let err = coordinator.connect(client.clone()).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyConnected(id) if id == client.id));
    assert_eq!(coordinator.clients(), vec![client.id]);
}

#[tokio::test]
async fn test_client_without_query_is_not_executed() {
    let (connector, coordinator) = setup();
    let client = RecordingClient::new("", None);

    coordinator.connect(client.clone()).await.unwrap();

    assert!(client.results().is_empty());
    assert_eq!(client.updates.load(Ordering::SeqCst), 0);
    assert!(connector.queries().is_empty());
    assert_eq!(coordinator.status(client.id), Some(QueryStatus::Idle));
}

#[tokio::test]
async fn test_crossfilter_update_refilters_other_clients() {
    let (_connector, coordinator) = setup();
    let selection = Selection::crossfilter();
    let hours = RecordingClient::new("HourOfDay", Some(&selection));
    let days = RecordingClient::new("DayOfWeek", Some(&selection));

    coordinator.connect(hours.clone()).await.unwrap();
    coordinator.connect(days.clone()).await.unwrap();
    assert_eq!(selection.subscriber_count(), 1);

    selection.update(
        clause_interval("HourOfDay", [2, 3], ClauseOptions::from_source(hours.id)).unwrap(),
    );
    coordinator.pending().await;

    assert!(days.last_result().contains(r#"WHERE ("HourOfDay" BETWEEN 2 AND 3)"#));
    assert!(!hours.last_result().contains("WHERE"));

    selection.update(
        clause_interval("DayOfWeek", [0, 4], ClauseOptions::from_source(days.id)).unwrap(),
    );
    coordinator.pending().await;

    assert!(hours.last_result().contains(r#"WHERE ("DayOfWeek" BETWEEN 0 AND 4)"#));
    assert!(days.last_result().contains(r#"WHERE ("HourOfDay" BETWEEN 2 AND 3)"#));
    assert!(!days.last_result().contains("DayOfWeek\" BETWEEN"));
}

#[tokio::test]
async fn test_rapid_param_updates_coalesce() {
    let (connector, coordinator) = setup();
    let selection = Selection::crossfilter();
    let hours = RecordingClient::new("HourOfDay", Some(&selection));
    let days = RecordingClient::new("DayOfWeek", Some(&selection));
    coordinator.connect(hours.clone()).await.unwrap();
    coordinator.connect(days.clone()).await.unwrap();

    let lo = Param::new(0);
    let hi = Param::new(24);
    let brush = ClientId::new();
    selection.update(
        clause_interval(
            "HourOfDay",
            [Bound::from(&lo), Bound::from(&hi)],
            ClauseOptions::from_source(brush),
        )
        .unwrap(),
    );
    coordinator.pending().await;
    let before = connector.queries().len();
    let generation = coordinator.generation(hours.id).unwrap();

    assert!(lo.update(2));
    assert!(lo.update(3));
    coordinator.pending().await;

    // One re-execution per dependent client
    assert_eq!(connector.queries().len(), before + 2);
    assert!(hours.last_result().contains(r#"("HourOfDay" BETWEEN 3 AND 24)"#));
    assert!(days.last_result().contains(r#"("HourOfDay" BETWEEN 3 AND 24)"#));
    let coalesced = coordinator.generation(hours.id).unwrap();
    assert!(coalesced > generation);

    // Equal value is a no-op
    assert!(!lo.update(3));
    coordinator.pending().await;
    assert_eq!(connector.queries().len(), before + 2);
    assert_eq!(coordinator.generation(hours.id), Some(coalesced));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rapid_updates_coalesce_on_worker_threads() {
    let mut repeated = 0;
    for _ in 0..50 {
        let (connector, coordinator) = setup();
        let selection = Selection::crossfilter();
        let days = RecordingClient::new("DayOfWeek", Some(&selection));
        coordinator.connect(days.clone()).await.unwrap();

        let lo = Param::new(0);
        let hi = Param::new(24);
        selection.update(
            clause_interval(
                "HourOfDay",
                [&lo, &hi],
                ClauseOptions::from_source(ClientId::new()),
            )
            .unwrap(),
        );
        coordinator.pending().await;
        let before = connector.queries().len();

        lo.update(2);
        lo.update(3);
        coordinator.pending().await;

        if connector.queries().len() != before + 1 {
            repeated += 1;
        }
        assert!(days.last_result().contains(r#"("HourOfDay" BETWEEN 3 AND 24)"#));
        coordinator.shutdown().await;
    }
    assert_eq!(repeated, 0);
}

#[tokio::test]
async fn test_overtaken_result_is_dropped() {
    let (connector, coordinator) = setup();
    let selection = Selection::intersect();
    let client = RecordingClient::new("DayOfWeek", Some(&selection));
    coordinator.connect(client.clone()).await.unwrap();

    let brush = ClauseOptions::from_source(ClientId::new());
    connector.hold(r#""HourOfDay" = 1"#);

    selection.update(clause_point("HourOfDay", 1, brush.clone()).unwrap());
    wait_for_calls(&connector, r#""HourOfDay" = 1"#, 1).await;

    selection.update(clause_point("HourOfDay", 2, brush).unwrap());
    coordinator.pending().await;
    assert!(client.last_result().contains(r#""HourOfDay" = 2"#));

    connector.release(r#""HourOfDay" = 1"#);
    settle().await;

    let results = client.results();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|sql| !sql.contains(r#""HourOfDay" = 1"#)));
}

#[tokio::test]
async fn test_execution_errors_stay_with_their_client() {
    let (connector, coordinator) = setup();
    let sink: Arc<Mutex<Vec<(ClientId, String)>>> = Arc::default();
    let captured = sink.clone();
    coordinator.set_error_sink(move |id, err| captured.lock().push((id, err.to_string())));

    connector.fail_on("Broken");
    let unhandled = RecordingClient::new("Broken", None);
    let handled = RecordingClient::handling_errors("AlsoBroken", None);
    let healthy = RecordingClient::new("HourOfDay", None);

    coordinator.connect(unhandled.clone()).await.unwrap();
    coordinator.connect(handled.clone()).await.unwrap();
    coordinator.connect(healthy.clone()).await.unwrap();

    assert_eq!(unhandled.errors.lock().len(), 1);
    assert_eq!(handled.errors.lock().len(), 1);
    assert_eq!(healthy.results().len(), 1);
    assert!(healthy.errors.lock().is_empty());

    let reported = sink.lock().clone();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].0, unhandled.id);
    assert_eq!(coordinator.status(unhandled.id), Some(QueryStatus::Idle));
}

#[tokio::test]
async fn test_disconnect_drops_outstanding_result() {
    let (connector, coordinator) = setup();
    let selection = Selection::intersect();
    let client = RecordingClient::new("DayOfWeek", Some(&selection));
    coordinator.connect(client.clone()).await.unwrap();

    connector.hold(r#""HourOfDay" = 5"#);
    selection.update(
        clause_point("HourOfDay", 5, ClauseOptions::from_source(ClientId::new())).unwrap(),
    );
    wait_for_calls(&connector, r#""HourOfDay" = 5"#, 1).await;

    coordinator.disconnect(client.id).unwrap();
    assert_eq!(selection.subscriber_count(), 0);
    assert!(coordinator.status(client.id).is_none());

    connector.release(r#""HourOfDay" = 5"#);
    settle().await;
    assert_eq!(client.results().len(), 1);

    assert!(matches!(
        coordinator.disconnect(client.id),
        Err(Error::NotConnected(_))
    ));
}

#[tokio::test]
async fn test_reconnect_drops_result_from_earlier_connection() {
    let (connector, coordinator) = setup();
    let selection = Selection::intersect();
    let client = RecordingClient::new("DayOfWeek", Some(&selection));
    let brush = ClauseOptions::from_source(ClientId::new());
    coordinator.connect(client.clone()).await.unwrap();

    connector.hold(r#""HourOfDay" = 5"#);
    selection.update(clause_point("HourOfDay", 5, brush.clone()).unwrap());
    wait_for_calls(&connector, r#""HourOfDay" = 5"#, 1).await;

    coordinator.disconnect(client.id).unwrap();
    selection.update(clause_point("HourOfDay", 6, brush.clone()).unwrap());
    coordinator.connect(client.clone()).await.unwrap();
    selection.update(clause_point("HourOfDay", 7, brush).unwrap());
    coordinator.pending().await;
    assert!(client.last_result().contains(r#""HourOfDay" = 7"#));

    connector.release(r#""HourOfDay" = 5"#);
    settle().await;

    assert!(client.last_result().contains(r#""HourOfDay" = 7"#));
    assert!(client.results().iter().all(|sql| !sql.contains(r#""HourOfDay" = 5"#)));
}

#[tokio::test]
async fn test_request_query_reexecutes_client() {
    let (connector, coordinator) = setup();
    coordinator.set_error_sink(|_, _| {});
    let client = RecordingClient::new("HourOfDay", None);
    coordinator.connect(client.clone()).await.unwrap();
    let first = coordinator.generation(client.id);

    coordinator.clear_cache();
    coordinator.request_query(client.id).unwrap();
    coordinator.pending().await;

    assert_eq!(client.results().len(), 2);
    assert_eq!(connector.queries().len(), 2);
    assert!(coordinator.generation(client.id) > first);
}

#[tokio::test]
async fn test_identical_queries_execute_once() {
    let (connector, coordinator) = setup();
    let query = Query::table("trips").select([("n", count())]);

    coordinator.prefetch(&query).await.unwrap();
    let batch = coordinator.query(&query).await.unwrap();
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(connector.queries().len(), 1);

    let stats = coordinator.cache_stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
}

#[tokio::test]
async fn test_exec_waits_for_reads_and_clears_cache() {
    let (connector, coordinator) = setup();
    let query = Query::table("trips").select([("n", count())]);
    connector.hold("trips");

    let reader = {
        let coordinator = coordinator.clone();
        let query = query.clone();
        tokio::spawn(async move { coordinator.query(&query).await })
    };
    wait_for_calls(&connector, "trips", 1).await;

    let writer = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.exec("DROP TABLE scratch").await })
    };
    settle().await;
    assert!(connector.statements.lock().is_empty());

    connector.release("trips");
    reader.await.unwrap().unwrap();
    writer.await.unwrap().unwrap();

    assert_eq!(*connector.statements.lock(), vec!["DROP TABLE scratch".to_string()]);
    assert_eq!(coordinator.cache_stats().entries, 0);
}

#[tokio::test]
async fn test_shutdown_rejects_new_clients() {
    let (_connector, coordinator) = setup();
    let selection = Selection::crossfilter();
    let client = RecordingClient::new("HourOfDay", Some(&selection));
    coordinator.connect(client.clone()).await.unwrap();

    coordinator.shutdown().await;

    assert!(coordinator.clients().is_empty());
    assert_eq!(selection.subscriber_count(), 0);
    let late = RecordingClient::new("DayOfWeek", None);
    assert!(matches!(coordinator.connect(late).await, Err(Error::Shutdown)));
    coordinator.pending().await;
}
