//! Runtime settings

use plume_core::DataSetSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Demo emitter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub ticks: u32,
    pub spawn_per_tick: usize,
    /// Particles older than this are killed.
    pub lifetime_ticks: i32,
    pub data_set: DataSetSettings,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            ticks: 120,
            spawn_per_tick: 16,
            lifetime_ticks: 30,
            data_set: DataSetSettings::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid runtime settings: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RuntimeSettings {
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }
}
