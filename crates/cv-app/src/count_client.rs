//! Grouped count client

use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use parking_lot::Mutex;
use tracing::{info, warn};

use cv_core::sql::{column, count};
use cv_core::{Client, ClientId, Error, Predicate, Query, Result, Selection};

/// Counts rows of a table per value of one column
pub struct CountClient {
    id: ClientId,
    label: String,
    table: String,
    column: String,
    filter_by: Selection,
    data: Mutex<Option<RecordBatch>>,
}

impl CountClient {
    pub fn new(label: &str, table: &str, column: &str, filter_by: &Selection) -> Self {
        Self {
            id: ClientId::new(),
            label: label.to_string(),
            table: table.to_string(),
            column: column.to_string(),
            filter_by: filter_by.clone(),
            data: Mutex::new(None),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Latest delivered result
    pub fn data(&self) -> Option<RecordBatch> {
        self.data.lock().clone()
    }
}

impl Client for CountClient {
    fn id(&self) -> ClientId {
        self.id
    }

    fn filter_by(&self) -> Option<Selection> {
        Some(self.filter_by.clone())
    }

    fn query(&self, filter: &Predicate) -> Option<Query> {
        Some(
            Query::table(&self.table)
                .select([("key", column(&self.column)), ("value", count())])
                .filter(filter)
                .group_by([column(&self.column)])
                .order_by(column(&self.column), false),
        )
    }

    fn query_result(&self, data: &RecordBatch) -> Result<()> {
        *self.data.lock() = Some(data.clone());
        Ok(())
    }

    fn query_error(&self, error: &Error) -> bool {
        warn!("[{}] query failed: {}", self.label, error);
        true
    }

    fn update(&self) {
        let Some(data) = self.data() else {
            return;
        };
        match pretty_format_batches(&[data]) {
            Ok(table) => info!("[{}] {} by {}\n{}", self.label, self.table, self.column, table),
            Err(e) => warn!("[{}] cannot format result: {}", self.label, e),
        }
    }
}
