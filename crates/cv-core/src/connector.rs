//! Data engine boundary

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

use crate::error::Result;

/// Connection to the analytical engine that executes serialized queries.
///
/// Only the coordinator talks to a connector; clients and selections produce
/// query descriptions and never touch it.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Execute a statement that returns no rows (DDL/DML)
    async fn exec(&self, sql: &str) -> Result<()>;

    /// Execute a read query and collect its rows
    async fn query(&self, sql: &str) -> Result<RecordBatch>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "connector"
    }
}
