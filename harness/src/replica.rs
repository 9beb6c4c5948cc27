//! Classifier training seam and per-stage replication across workers.
//!
//! Retraining happens only on the orchestrator thread, between stages. The
//! result is replicated once per worker into a [`ReplicaMap`]; workers only
//! ever read their replica.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sieve_kernel::model::WorldState;
use sieve_search::classifier::{AlwaysAccept, FeasibilityClassifier};
use sieve_search::error::CollaboratorFault;

use crate::dataset::FeasibilityDataset;

/// A compute device a classifier replica is placed on, e.g. `cpu` or `cuda:1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Device(pub String);

impl Device {
    #[must_use]
    pub fn cpu() -> Self {
        Self("cpu".into())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A classifier produced by training.
pub trait TrainedClassifier<S: WorldState>: FeasibilityClassifier<S> {
    /// An independent read-only copy placed on `device`.
    fn replicate(&self, device: &Device) -> Arc<dyn FeasibilityClassifier<S>>;

    /// Opaque serialized form, persisted with each stage snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`CollaboratorFault`] if the model cannot be serialized.
    fn snapshot(&self) -> Result<Vec<u8>, CollaboratorFault>;
}

/// Fits a fresh classifier on the accumulated datasets.
pub trait ClassifierTrainer<S: WorldState> {
    /// Train on `train`, calibrate on `validation`. The returned classifier
    /// must only accept queries with prefix length `>= min_inference_prefix`.
    ///
    /// # Errors
    ///
    /// Returns a [`CollaboratorFault`] if training fails.
    fn fit(
        &mut self,
        train: &FeasibilityDataset<S>,
        validation: &FeasibilityDataset<S>,
        min_inference_prefix: usize,
    ) -> Result<Box<dyn TrainedClassifier<S>>, CollaboratorFault>;
}

/// Explicit `worker_id -> replica` mapping for one curriculum stage.
///
/// Devices are assigned round-robin. Rebuilt whenever the classifier changes.
pub struct ReplicaMap<S: WorldState> {
    replicas: Vec<(Device, Arc<dyn FeasibilityClassifier<S>>)>,
}

impl<S: WorldState> ReplicaMap<S> {
    /// One replica of `classifier` per worker, or the always-accept stand-in
    /// when nothing has been trained yet.
    #[must_use]
    pub fn build(
        classifier: Option<&dyn TrainedClassifier<S>>,
        num_workers: usize,
        devices: &[Device],
    ) -> Self {
        let cpu = [Device::cpu()];
        let devices = if devices.is_empty() { &cpu[..] } else { devices };
        let fallback: Arc<dyn FeasibilityClassifier<S>> = Arc::new(AlwaysAccept);
        let replicas = (0..num_workers.max(1))
            .map(|worker_id| {
                let device = devices[worker_id % devices.len()].clone();
                let replica = match classifier {
                    Some(trained) => trained.replicate(&device),
                    None => Arc::clone(&fallback),
                };
                (device, replica)
            })
            .collect();
        Self { replicas }
    }

    /// The replica owned by `worker_id`.
    #[must_use]
    pub fn replica(&self, worker_id: usize) -> &dyn FeasibilityClassifier<S> {
        self.replicas[worker_id % self.replicas.len()].1.as_ref()
    }

    #[must_use]
    pub fn device(&self, worker_id: usize) -> &Device {
        &self.replicas[worker_id % self.replicas.len()].0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// Never true: a map always holds at least one replica.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }
}
