//! Data engine glue for the coordination engine
//!
//! An embedded SQLite connector, Arrow conversion of result rows, a JSON
//! dataset loader and the dataset configuration.

pub mod config;
pub mod connector;
pub mod loader;

use arrow::error::ArrowError;
use tokio::task::JoinError;
use thiserror::Error;

// Re-exports
pub use config::DatasetConfig;
pub use connector::SqliteConnector;
pub use loader::{derive_calendar_fields, load_json_file, load_json_records};

/// Errors that can occur in data operations
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("SQLite error: {0}")]
    Sqlite(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Schema detection error: {0}")]
    SchemaDetection(String),

    #[error("Join error: {0}")]
    Join(#[from] JoinError),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<rusqlite::Error> for DataError {
    fn from(error: rusqlite::Error) -> Self {
        DataError::Sqlite(error.to_string())
    }
}

impl From<serde_json::Error> for DataError {
    fn from(error: serde_json::Error) -> Self {
        DataError::Json(error.to_string())
    }
}

impl From<DataError> for cv_core::Error {
    fn from(error: DataError) -> Self {
        cv_core::Error::Connector(error.to_string())
    }
}
