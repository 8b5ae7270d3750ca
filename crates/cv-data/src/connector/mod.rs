//! Connector implementations

pub mod convert;
pub mod sqlite;

pub use convert::rows_to_batch;
pub use sqlite::SqliteConnector;
