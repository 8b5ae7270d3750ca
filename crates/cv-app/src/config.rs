//! Demo configuration

use std::path::Path;
use anyhow::{Context, Result};
use serde::{Serialize, Deserialize};

use cv_core::CoordinatorConfig;
use cv_data::DatasetConfig;

/// Everything the demo can be configured with
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dataset: DatasetConfig,
    pub coordinator: CoordinatorConfig,

    /// Trips to generate when no dataset file is given
    pub synthetic_rows: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            coordinator: CoordinatorConfig {
                log_queries: true,
                ..Default::default()
            },
            synthetic_rows: 5_000,
        }
    }
}

impl AppConfig {
    /// Read the config file named by `CROSSVIEW_CONFIG`, if set
    pub fn from_env() -> Result<Self> {
        match std::env::var_os("CROSSVIEW_CONFIG") {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }
}
