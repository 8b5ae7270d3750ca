//! Cross-filter demo entry point
//!
//! Loads trips into an in-memory SQLite database, registers two counting
//! clients on one cross-filter selection and drives the selection through
//! four parameter updates, logging every predicate and result.

use std::sync::Arc;
use anyhow::Result;
use tracing::info;

use cv_core::{
    clause_interval, ClauseOptions, Client, Coordinator, Param, Selection, SelectionMode,
};
use cv_data::{derive_calendar_fields, load_json_file, load_json_records, SqliteConnector};

mod config;
mod count_client;
mod sample_data;

use config::AppConfig;
use count_client::CountClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let mut config = AppConfig::from_env()?;
    if let Some(path) = std::env::args().nth(1) {
        config.dataset.path = Some(path.into());
    }
    let dataset = &config.dataset;
    info!("Starting crossview demo on {}", dataset.file_name());

    let connector = Arc::new(SqliteConnector::open_in_memory()?);
    let rows = match &dataset.path {
        Some(path) => load_json_file(&connector, &dataset.table, path).await?,
        None => {
            let trips = sample_data::generate_trips(config.synthetic_rows, 42)?;
            load_json_records(&connector, &dataset.table, trips).await?
        }
    };
    info!("Dataset '{}' holds {} rows", dataset.table, rows);

    let coordinator = Coordinator::start(connector.clone(), config.coordinator.clone());
    coordinator
        .exec(&derive_calendar_fields(
            &dataset.table,
            &dataset.timestamp_column,
            dataset.time_zone_offset_hours,
        ))
        .await?;

    let selection = Selection::named("trips", SelectionMode::Crossfilter);
    let hours = Arc::new(CountClient::new("hours", &dataset.table, "HourOfDay", &selection));
    let days = Arc::new(CountClient::new("days", &dataset.table, "DayOfWeek", &selection));
    coordinator.connect(hours.clone()).await?;
    coordinator.connect(days.clone()).await?;

    let c1 = Param::new(0);
    let c2 = Param::new(24);
    let c3 = Param::new(0);
    let c4 = Param::new(7);

    selection.update(clause_interval(
        "HourOfDay",
        [&c1, &c2],
        ClauseOptions::from_source(hours.id()),
    )?);
    selection.update(clause_interval(
        "DayOfWeek",
        [&c3, &c4],
        ClauseOptions::from_source(days.id()),
    )?);
    coordinator.pending().await;
    log_predicates(&selection, &[&hours, &days]);

    for (name, param, value) in [("c1", &c1, 2), ("c2", &c2, 3), ("c3", &c3, 0), ("c4", &c4, 1)] {
        if !param.update(value) {
            info!("{} already {}, nothing to do", name, value);
            continue;
        }
        info!("{} -> {}", name, value);
        coordinator.pending().await;
        log_predicates(&selection, &[&hours, &days]);
    }

    let stats = coordinator.cache_stats();
    info!(
        "Cache: {} hits, {} misses, {} entries",
        stats.hits, stats.misses, stats.entries
    );

    coordinator.shutdown().await;
    Ok(())
}

fn log_predicates(selection: &Selection, clients: &[&Arc<CountClient>]) {
    for client in clients {
        let predicate = selection.predicate(client.id());
        if predicate.is_empty() {
            info!("[{}] unfiltered", client.label());
        } else {
            info!("[{}] filtered by {}", client.label(), predicate);
        }
    }
}
