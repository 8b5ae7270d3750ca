//! Query result caching
//!
//! Results are keyed by SQL text. Each entry is a once-cell, so concurrent
//! requests for the same SQL share a single execution.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::error::Result;

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// LRU cache of query results
pub struct QueryCache {
    /// Ordered from least to most recently used
    entries: Mutex<IndexMap<String, Arc<OnceCell<RecordBatch>>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached result for `sql`, running `execute` at most once
    /// across concurrent callers. Failures are not cached.
    pub async fn get_or_execute<F, Fut>(&self, sql: &str, execute: F) -> Result<RecordBatch>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RecordBatch>>,
    {
        let cell = {
            let mut entries = self.entries.lock();
            match entries.shift_remove(sql) {
                Some(cell) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    entries.insert(sql.to_string(), Arc::clone(&cell));
                    cell
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    let cell = Arc::new(OnceCell::new());
                    entries.insert(sql.to_string(), Arc::clone(&cell));

                    // Simple LRU eviction if over capacity
                    while entries.len() > self.capacity {
                        entries.shift_remove_index(0);
                    }
                    cell
                }
            }
        };

        match cell.get_or_try_init(execute).await {
            Ok(batch) => Ok(batch.clone()),
            Err(e) => {
                let mut entries = self.entries.lock();
                if entries.get(sql).map_or(false, |c| Arc::ptr_eq(c, &cell)) {
                    entries.shift_remove(sql);
                }
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().len(),
        }
    }

    /// Clear the cache
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
