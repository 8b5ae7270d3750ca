//! SQLite connector implementation

use std::path::Path;
use std::sync::Arc;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;

use super::convert::rows_to_batch;
use crate::DataError;

/// Embedded SQLite engine behind the coordinator's connector boundary.
///
/// Every call runs on the blocking thread pool against one shared
/// connection, so statements and reads are applied in the order they
/// acquire it.
pub struct SqliteConnector {
    name: String,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConnector {
    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, DataError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection("sqlite::memory", conn))
    }

    /// Open (or create) a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| DataError::Sqlite(format!("Failed to open {}: {}", path.display(), e)))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.db")
            .to_string();
        Ok(Self::from_connection(name, conn))
    }

    fn from_connection(name: impl Into<String>, conn: Connection) -> Self {
        Self {
            name: name.into(),
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking thread pool
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T, DataError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DataError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await?
    }

    /// Execute one or more `;`-separated statements
    pub async fn execute_batch(&self, sql: &str) -> Result<(), DataError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| Ok(conn.execute_batch(&sql)?)).await
    }

    /// Execute a read query and collect its rows
    pub async fn query_batch(&self, sql: &str) -> Result<RecordBatch, DataError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            rows_to_batch(&mut stmt)
        })
        .await
    }
}

#[async_trait]
impl cv_core::Connector for SqliteConnector {
    async fn exec(&self, sql: &str) -> cv_core::Result<()> {
        self.execute_batch(sql).await.map_err(Into::into)
    }

    async fn query(&self, sql: &str) -> cv_core::Result<RecordBatch> {
        self.query_batch(sql).await.map_err(Into::into)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
