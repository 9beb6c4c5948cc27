//! Data-collection configuration.
//!
//! One immutable value, loaded once and cloned into every stage; workers
//! read their own copy and nothing writes to it after validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sieve_search::error::InvalidSearch;
use sieve_search::policy::SearchConfig;
use thiserror::Error;

use crate::replica::Device;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid collection config: {detail}")]
    Invalid { detail: String },
    #[error(transparent)]
    Search(#[from] InvalidSearch),
}

/// Knobs of the curriculum data-collection loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Size of the worker pool.
    pub num_workers: usize,
    /// Devices classifier replicas are placed on, assigned round-robin.
    pub devices: Vec<Device>,
    /// Share of the corpus (and of each stage's quota) reserved for validation.
    pub validation_fraction: f64,
    /// Searches launched per stage, train and validation together.
    pub datapoints_per_stage: usize,
    pub base_seed: u64,
    /// Seed of the one-time corpus shuffle.
    pub shuffle_seed: u64,
    /// Validation searches draw seeds from `seed + validation_seed_offset`.
    pub validation_seed_offset: u64,
    /// Minimum seed advance between stages.
    pub min_seed_stride: u64,
    /// Primitive-action horizon of a full refinement.
    pub horizon: usize,
    /// Where per-stage snapshots are written; `None` disables snapshots.
    pub snapshot_dir: Option<PathBuf>,
    pub search: SearchConfig,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            devices: Vec::new(),
            validation_fraction: 0.1,
            datapoints_per_stage: 100,
            base_seed: 0,
            shuffle_seed: 0,
            validation_seed_offset: 50_000,
            min_seed_stride: 100_000,
            horizon: 400,
            snapshot_dir: None,
            search: SearchConfig::default(),
        }
    }
}

impl CollectionConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty pool, an out-of-range
    /// validation fraction, or seed ranges that could overlap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.search.validate()?;
        if self.num_workers == 0 {
            return Err(ConfigError::Invalid {
                detail: "num_workers must be > 0".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.validation_fraction) {
            return Err(ConfigError::Invalid {
                detail: format!(
                    "validation_fraction must be within [0, 1], got {}",
                    self.validation_fraction
                ),
            });
        }
        let per_stage = self.datapoints_per_stage as u64;
        if per_stage > self.validation_seed_offset {
            return Err(ConfigError::Invalid {
                detail: format!(
                    "datapoints_per_stage ({per_stage}) exceeds validation_seed_offset ({}); training and validation seeds would overlap",
                    self.validation_seed_offset
                ),
            });
        }
        if self.validation_seed_offset.saturating_add(per_stage) > self.seed_stride() {
            return Err(ConfigError::Invalid {
                detail: "validation seeds of one stage would overlap the next stage".into(),
            });
        }
        Ok(())
    }

    /// Seed advance between consecutive stages.
    #[must_use]
    pub fn seed_stride(&self) -> u64 {
        (self.datapoints_per_stage as u64).max(self.min_seed_stride)
    }
}

/// Read a [`CollectionConfig`] from a JSON file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read, parsed, or fails validation.
pub fn load_collection_config(path: &Path) -> Result<CollectionConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: CollectionConfig = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
}
