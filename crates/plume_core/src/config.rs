//! Data-set settings

use crate::data_set::IdTableShrinkPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What happens when a float component turns out to be NaN or infinite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NanPolicy {
    /// Never scan during `tick`; explicit checks still log an error.
    #[default]
    Ignore,
    /// Scan on every `tick` and log an error.
    Report,
    /// Scan on every `tick` and panic.
    Fatal,
}

/// Per data-set behavior knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSetSettings {
    pub nan_policy: NanPolicy,
    /// Dump the offending buffer when NaNs are found.
    pub dump_on_nan: bool,
    pub id_table_shrink: IdTableShrinkPolicy,
    /// Upper bound on instances written by a diagnostic dump.
    pub dump_max_instances: usize,
}

impl Default for DataSetSettings {
    fn default() -> Self {
        Self {
            nan_policy: NanPolicy::Ignore,
            dump_on_nan: true,
            id_table_shrink: IdTableShrinkPolicy::Never,
            dump_max_instances: 64,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid data set settings: {0}")]
    Parse(#[from] serde_json::Error),
}

impl DataSetSettings {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }
}
