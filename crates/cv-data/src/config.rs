//! Dataset configuration

use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};

use crate::DataError;

/// Where the dataset comes from and how its calendar fields are derived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// JSON records file; `None` generates a synthetic dataset
    pub path: Option<PathBuf>,

    /// Table the records are loaded into
    pub table: String,

    /// Column holding ISO-8601 timestamps
    pub timestamp_column: String,

    /// Offset applied before extracting calendar fields
    pub time_zone_offset_hours: i32,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: None,
            table: "testData".to_string(),
            timestamp_column: "TripCreated".to_string(),
            time_zone_offset_hours: 0,
        }
    }
}

impl DatasetConfig {
    /// Configuration for a records file with default table settings
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(text: &str) -> Result<Self, DataError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Get the file name
    pub fn file_name(&self) -> String {
        self.path
            .as_ref()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("synthetic")
            .to_string()
    }
}
