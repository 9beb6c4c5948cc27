//! Per-stage snapshot persistence: write/read the datasets and classifier
//! after each curriculum stage.
//!
//! # Directory layout
//!
//! ```text
//! <snapshot_dir>/prefix-<p>/
//!   manifest.json              — stage, file digests, search config digest
//!   dataset-train.json         — FeasibilityDataset::dump
//!   dataset-validation.json    — FeasibilityDataset::dump
//!   classifier.bin             — TrainedClassifier::snapshot (absent if untrained)
//! ```
//!
//! # Fail-closed semantics
//!
//! - Missing declared file → error
//! - Digest mismatch → error
//! - Unknown manifest version → error

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sieve_kernel::model::WorldState;
use sieve_kernel::proof::hash::{canonical_hash, ContentHash};
use sieve_kernel::proof::hash_domain::HashDomain;
use sieve_search::policy::SearchConfig;
use thiserror::Error;

use crate::dataset::{DatasetError, FeasibilityDataset};

const MANIFEST_FILENAME: &str = "manifest.json";
const TRAIN_FILENAME: &str = "dataset-train.json";
const VALIDATION_FILENAME: &str = "dataset-validation.json";
const CLASSIFIER_FILENAME: &str = "classifier.bin";

pub const SNAPSHOT_MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("snapshot manifest is malformed: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("unsupported snapshot manifest version {found}")]
    VersionMismatch { found: u32 },
    #[error("snapshot file {name} is declared but missing")]
    MissingFile { name: String },
    #[error("snapshot file {name} digest mismatch: stored={stored}, recomputed={recomputed}")]
    DigestMismatch {
        name: String,
        stored: ContentHash,
        recomputed: ContentHash,
    },
}

/// `manifest.json` contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub version: u32,
    pub stage: usize,
    pub search_config_digest: ContentHash,
    /// File name → content digest, for every file in the directory besides the manifest.
    pub files: BTreeMap<String, ContentHash>,
}

/// A snapshot read back from disk.
#[derive(Debug)]
pub struct StageSnapshot<S> {
    pub manifest: SnapshotManifest,
    pub train: FeasibilityDataset<S>,
    pub validation: FeasibilityDataset<S>,
    pub classifier: Option<Vec<u8>>,
}

/// Directory holding the snapshot for stage `stage`.
#[must_use]
pub fn stage_dir(root: &Path, stage: usize) -> PathBuf {
    root.join(format!("prefix-{stage}"))
}

fn file_digest(name: &str, bytes: &[u8]) -> ContentHash {
    let domain = if name == CLASSIFIER_FILENAME {
        HashDomain::ClassifierSnapshot
    } else {
        HashDomain::DatasetSnapshot
    };
    canonical_hash(domain, bytes)
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), SnapshotError> {
    let path = dir.join(name);
    std::fs::write(&path, bytes).map_err(|source| SnapshotError::Io { path, source })
}

fn read_file(dir: &Path, name: &str) -> Result<Vec<u8>, SnapshotError> {
    let path = dir.join(name);
    match std::fs::read(&path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SnapshotError::MissingFile {
            name: name.to_string(),
        }),
        Err(source) => Err(SnapshotError::Io { path, source }),
    }
}

/// Write the stage-`stage` snapshot under `root`, replacing any previous one.
///
/// Returns the stage directory.
///
/// # Errors
///
/// Returns [`SnapshotError`] on I/O or serialization failure.
pub fn write_stage_snapshot<S: WorldState + Serialize>(
    root: &Path,
    stage: usize,
    train: &FeasibilityDataset<S>,
    validation: &FeasibilityDataset<S>,
    classifier: Option<&[u8]>,
    search_config: &SearchConfig,
) -> Result<PathBuf, SnapshotError> {
    let dir = stage_dir(root, stage);
    std::fs::create_dir_all(&dir).map_err(|source| SnapshotError::Io {
        path: dir.clone(),
        source,
    })?;

    let mut files = BTreeMap::new();
    let mut artifacts: Vec<(&str, Vec<u8>)> =
        vec![(TRAIN_FILENAME, train.dump()?), (VALIDATION_FILENAME, validation.dump()?)];
    if let Some(blob) = classifier {
        artifacts.push((CLASSIFIER_FILENAME, blob.to_vec()));
    } else {
        // A stale blob from an earlier run must not outlive its manifest entry.
        let stale = dir.join(CLASSIFIER_FILENAME);
        if stale.exists() {
            std::fs::remove_file(&stale).map_err(|source| SnapshotError::Io { path: stale, source })?;
        }
    }
    for (name, bytes) in &artifacts {
        write_file(&dir, name, bytes)?;
        files.insert((*name).to_string(), file_digest(name, bytes));
    }

    let manifest = SnapshotManifest {
        version: SNAPSHOT_MANIFEST_VERSION,
        stage,
        search_config_digest: canonical_hash(HashDomain::SearchConfig, &serde_json::to_vec(search_config)?),
        files,
    };
    write_file(&dir, MANIFEST_FILENAME, &serde_json::to_vec_pretty(&manifest)?)?;
    Ok(dir)
}

/// Read and verify a snapshot directory written by [`write_stage_snapshot`].
///
/// # Errors
///
/// Returns [`SnapshotError`] if a file is missing, a digest does not match,
/// or a dataset fails to load.
pub fn read_stage_snapshot<S: WorldState + DeserializeOwned>(dir: &Path) -> Result<StageSnapshot<S>, SnapshotError> {
    let manifest: SnapshotManifest = serde_json::from_slice(&read_file(dir, MANIFEST_FILENAME)?)?;
    if manifest.version != SNAPSHOT_MANIFEST_VERSION {
        return Err(SnapshotError::VersionMismatch {
            found: manifest.version,
        });
    }

    let mut contents = BTreeMap::new();
    for (name, stored) in &manifest.files {
        let bytes = read_file(dir, name)?;
        let recomputed = file_digest(name, &bytes);
        if &recomputed != stored {
            return Err(SnapshotError::DigestMismatch {
                name: name.clone(),
                stored: stored.clone(),
                recomputed,
            });
        }
        contents.insert(name.as_str(), bytes);
    }

    let dataset = |name: &str| -> Result<FeasibilityDataset<S>, SnapshotError> {
        let bytes = contents.get(name).ok_or_else(|| SnapshotError::MissingFile {
            name: name.to_string(),
        })?;
        Ok(FeasibilityDataset::load(bytes)?)
    };
    let train = dataset(TRAIN_FILENAME)?;
    let validation = dataset(VALIDATION_FILENAME)?;
    let classifier = contents.get(CLASSIFIER_FILENAME).cloned();

    Ok(StageSnapshot {
        manifest,
        train,
        validation,
        classifier,
    })
}
