//! Feasibility dataset: labeled state prefixes accumulated across curriculum
//! stages.
//!
//! Datapoints are folded idempotently. The identity of a datapoint is its
//! skeleton, the fingerprints of its states and its label; the stage at
//! which it was found is recorded but does not take part in the identity,
//! so replaying a stage never inflates the counters.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sieve_kernel::model::{ModelError, Skeleton, WorldState};
use sieve_kernel::proof::hash::{canonical_hash, ContentHash, DomainHasher};
use sieve_kernel::proof::hash_domain::HashDomain;
use thiserror::Error;

/// Current `dump()` format version.
pub const DATASET_FORMAT_VERSION: u32 = 1;

/// A state prefix paired with the skeleton it was refined against.
///
/// `1 <= states.len() <= skeleton.len() + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityDatapoint<S> {
    pub states: Vec<S>,
    pub skeleton: Skeleton,
}

impl<S: WorldState> FeasibilityDatapoint<S> {
    /// # Errors
    ///
    /// Returns [`ModelError`] if the prefix is empty or longer than the
    /// skeleton allows.
    pub fn new(skeleton: Skeleton, states: Vec<S>) -> Result<Self, ModelError> {
        if states.is_empty() {
            return Err(ModelError::EmptyStatePrefix);
        }
        if states.len() > skeleton.len() + 1 {
            return Err(ModelError::StatePrefixTooLong {
                states: states.len(),
                steps: skeleton.len(),
            });
        }
        Ok(Self { states, skeleton })
    }

    /// Number of refined steps covered by `states`.
    #[must_use]
    pub fn prefix_length(&self) -> usize {
        self.states.len() - 1
    }

    fn identity(&self, label: Label) -> ContentHash {
        let mut hasher = DomainHasher::new(HashDomain::FeasibilityDatapoint);
        hasher.part(label.as_str().as_bytes());
        self.skeleton.feed(&mut hasher);
        hasher.part_u64(self.states.len() as u64);
        for state in &self.states {
            hasher.part(state.fingerprint().as_str().as_bytes());
        }
        hasher.finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    /// The prefix was extended to a full refinement.
    Positive,
    /// The prefix was simulated and then failed.
    Negative,
    /// A full successful refinement, used to enrich training.
    Augmentation,
}

impl Label {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Augmentation => "augmentation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledDatapoint<S> {
    pub datapoint: FeasibilityDatapoint<S>,
    pub label: Label,
    /// Curriculum stage (prefix length) at which the datapoint was found.
    pub stage: usize,
}

/// Error while folding, dumping or loading a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("invalid datapoint: {0}")]
    InvalidDatapoint(#[from] ModelError),
    #[error("dataset serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unsupported dataset format version {found} (expected {DATASET_FORMAT_VERSION})")]
    VersionMismatch { found: u32 },
}

#[derive(Serialize, Deserialize)]
struct DatasetBlob<S> {
    version: u32,
    stage: usize,
    positives: Vec<LabeledDatapoint<S>>,
    negatives: Vec<LabeledDatapoint<S>>,
    augmentations: Vec<LabeledDatapoint<S>>,
}

/// Accumulator of labeled training examples.
#[derive(Debug, Clone)]
pub struct FeasibilityDataset<S> {
    positives: Vec<LabeledDatapoint<S>>,
    negatives: Vec<LabeledDatapoint<S>>,
    augmentations: Vec<LabeledDatapoint<S>>,
    seen: HashSet<ContentHash>,
    stage: usize,
}

impl<S> Default for FeasibilityDataset<S> {
    fn default() -> Self {
        Self {
            positives: Vec::new(),
            negatives: Vec::new(),
            augmentations: Vec::new(),
            seen: HashSet::new(),
            stage: 0,
        }
    }
}

impl<S: WorldState> FeasibilityDataset<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag subsequently added datapoints with curriculum stage `stage`.
    pub fn enter_stage(&mut self, stage: usize) {
        self.stage = stage;
    }

    #[must_use]
    pub fn stage(&self) -> usize {
        self.stage
    }

    /// Returns `true` if the datapoint was new.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidDatapoint`] if the prefix length is out of range.
    pub fn add_positive(&mut self, skeleton: &Skeleton, states: Vec<S>) -> Result<bool, DatasetError> {
        self.add(Label::Positive, skeleton, states)
    }

    /// Returns `true` if the datapoint was new.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidDatapoint`] if the prefix length is out of range.
    pub fn add_negative(&mut self, skeleton: &Skeleton, states: Vec<S>) -> Result<bool, DatasetError> {
        self.add(Label::Negative, skeleton, states)
    }

    /// Returns `true` if the datapoint was new.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidDatapoint`] if the prefix length is out of range.
    pub fn add_augmentation(&mut self, skeleton: &Skeleton, states: Vec<S>) -> Result<bool, DatasetError> {
        self.add(Label::Augmentation, skeleton, states)
    }

    fn add(&mut self, label: Label, skeleton: &Skeleton, states: Vec<S>) -> Result<bool, DatasetError> {
        let datapoint = FeasibilityDatapoint::new(skeleton.clone(), states)?;
        if !self.seen.insert(datapoint.identity(label)) {
            return Ok(false);
        }
        let entry = LabeledDatapoint {
            datapoint,
            label,
            stage: self.stage,
        };
        match label {
            Label::Positive => self.positives.push(entry),
            Label::Negative => self.negatives.push(entry),
            Label::Augmentation => self.augmentations.push(entry),
        }
        Ok(true)
    }

    #[must_use]
    pub fn num_positive_datapoints(&self) -> usize {
        self.positives.len()
    }

    #[must_use]
    pub fn num_negative_datapoints(&self) -> usize {
        self.negatives.len()
    }

    #[must_use]
    pub fn num_augmentation_datapoints(&self) -> usize {
        self.augmentations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn positives(&self) -> impl Iterator<Item = &FeasibilityDatapoint<S>> {
        self.positives.iter().map(|e| &e.datapoint)
    }

    pub fn negatives(&self) -> impl Iterator<Item = &FeasibilityDatapoint<S>> {
        self.negatives.iter().map(|e| &e.datapoint)
    }

    pub fn augmentations(&self) -> impl Iterator<Item = &FeasibilityDatapoint<S>> {
        self.augmentations.iter().map(|e| &e.datapoint)
    }

    /// Every labeled datapoint, positives first.
    pub fn iter(&self) -> impl Iterator<Item = &LabeledDatapoint<S>> {
        self.positives
            .iter()
            .chain(&self.negatives)
            .chain(&self.augmentations)
    }

    /// Labeled datapoints found at curriculum stage `stage`.
    pub fn datapoints_for_stage(&self, stage: usize) -> impl Iterator<Item = &LabeledDatapoint<S>> {
        self.iter().filter(move |e| e.stage == stage)
    }
}

impl<S: WorldState + Serialize> FeasibilityDataset<S> {
    /// Serialize to an opaque, versioned blob.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Serialization`] if a state fails to serialize.
    pub fn dump(&self) -> Result<Vec<u8>, DatasetError> {
        let blob = DatasetBlob {
            version: DATASET_FORMAT_VERSION,
            stage: self.stage,
            positives: self.positives.clone(),
            negatives: self.negatives.clone(),
            augmentations: self.augmentations.clone(),
        };
        Ok(serde_json::to_vec(&blob)?)
    }

    /// Content hash of [`FeasibilityDataset::dump`].
    ///
    /// # Errors
    ///
    /// See [`FeasibilityDataset::dump`].
    pub fn digest(&self) -> Result<ContentHash, DatasetError> {
        Ok(canonical_hash(HashDomain::DatasetSnapshot, &self.dump()?))
    }
}

impl<S: WorldState + DeserializeOwned> FeasibilityDataset<S> {
    /// Restore a dataset written by [`FeasibilityDataset::dump`].
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the blob is malformed, has another
    /// version, or holds an invalid datapoint.
    pub fn load(bytes: &[u8]) -> Result<Self, DatasetError> {
        let blob: DatasetBlob<S> = serde_json::from_slice(bytes)?;
        if blob.version != DATASET_FORMAT_VERSION {
            return Err(DatasetError::VersionMismatch { found: blob.version });
        }
        let mut dataset = Self::new();
        for entry in blob
            .positives
            .into_iter()
            .chain(blob.negatives)
            .chain(blob.augmentations)
        {
            dataset.enter_stage(entry.stage);
            dataset.add(entry.label, &entry.datapoint.skeleton, entry.datapoint.states)?;
        }
        dataset.enter_stage(blob.stage);
        Ok(dataset)
    }
}
