//! Pipeline configuration
//!
//! Values are resolved in precedence order: defaults, then an optional TOML
//! file, then `GEOROCKET_*` environment variables.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GeoRocketError, Result};

/// Configuration of the import side of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Number of queued chunks that triggers an index batch
    pub max_bulk_size: usize,
    /// Trailing-edge delay before a partial batch is indexed anyway
    pub index_debounce_ms: u64,
    /// Capacity of the splitter-to-store chunk channel
    pub chunk_queue_capacity: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_bulk_size: 200,
            index_debounce_ms: 100,
            chunk_queue_capacity: 8,
        }
    }
}

/// Configuration of the query side of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Number of chunk blobs fetched concurrently while merging
    pub parallelism: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { parallelism: 32 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub import: ImportConfig,
    pub fetch: FetchConfig,
}

impl PipelineConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(text).map_err(|e| GeoRocketError::ConfigInvalid {
                key: "<toml>".to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file and apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Override individual values from `GEOROCKET_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = read_env_usize("GEOROCKET_IMPORT_MAX_BULK_SIZE")? {
            self.import.max_bulk_size = v;
        }
        if let Some(v) = read_env_usize("GEOROCKET_IMPORT_INDEX_DEBOUNCE_MS")? {
            self.import.index_debounce_ms = v as u64;
        }
        if let Some(v) = read_env_usize("GEOROCKET_IMPORT_CHUNK_QUEUE_CAPACITY")? {
            self.import.chunk_queue_capacity = v;
        }
        if let Some(v) = read_env_usize("GEOROCKET_FETCH_PARALLELISM")? {
            self.fetch.parallelism = v;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.import.max_bulk_size == 0 {
            return Err(GeoRocketError::ConfigInvalid {
                key: "import.max_bulk_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.import.chunk_queue_capacity == 0 {
            return Err(GeoRocketError::ConfigInvalid {
                key: "import.chunk_queue_capacity".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.fetch.parallelism == 0 {
            return Err(GeoRocketError::ConfigInvalid {
                key: "fetch.parallelism".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn read_env_usize(key: &str) -> Result<Option<usize>> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<usize>()
            .map(Some)
            .map_err(|e| GeoRocketError::ConfigInvalid {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
