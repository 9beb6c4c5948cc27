//! End-to-end curriculum collection over the corridor world.
//!
//! Proves:
//! 1. Stages run from the longest prefix down to 1, one report each
//! 2. The first stage searches with the always-accept stand-in; every later
//!    stage replicates the freshly fitted classifier once per worker
//! 3. Per-stage snapshots land on disk and read back intact
//! 4. Every stored datapoint respects the prefix-length bound

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lock_tests::init_logging;
use sieve_harness::collect::{collect, CollectionReport};
use sieve_harness::config::CollectionConfig;
use sieve_harness::corpus::Demonstration;
use sieve_harness::dataset::FeasibilityDataset;
use sieve_harness::replica::{ClassifierTrainer, Device, TrainedClassifier};
use sieve_harness::snapshot::{read_stage_snapshot, stage_dir};
use sieve_harness::worlds::corridor::{Corridor, FuelMargin, FuelMarginTrainer};
use sieve_kernel::model::ObjectState;
use sieve_search::classifier::{FeasibilityClassifier, FeasibilityQuery, InferenceWindow, Verdict};
use sieve_search::error::CollaboratorFault;

/// Wraps a fitted classifier and counts how often it is replicated.
struct Counted {
    inner: Box<dyn TrainedClassifier<ObjectState>>,
    replications: Arc<AtomicUsize>,
}

impl FeasibilityClassifier<ObjectState> for Counted {
    fn classify(&self, query: &FeasibilityQuery<'_, ObjectState>) -> Result<Verdict, CollaboratorFault> {
        self.inner.classify(query)
    }

    fn inference_window(&self) -> InferenceWindow {
        self.inner.inference_window()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

impl TrainedClassifier<ObjectState> for Counted {
    fn replicate(&self, device: &Device) -> Arc<dyn FeasibilityClassifier<ObjectState>> {
        self.replications.fetch_add(1, Ordering::SeqCst);
        self.inner.replicate(device)
    }

    fn snapshot(&self) -> Result<Vec<u8>, CollaboratorFault> {
        self.inner.snapshot()
    }
}

#[derive(Default)]
struct CountingTrainer {
    inner: FuelMarginTrainer,
    replications: Arc<AtomicUsize>,
}

impl ClassifierTrainer<ObjectState> for CountingTrainer {
    fn fit(
        &mut self,
        train: &FeasibilityDataset<ObjectState>,
        validation: &FeasibilityDataset<ObjectState>,
        min_inference_prefix: usize,
    ) -> Result<Box<dyn TrainedClassifier<ObjectState>>, CollaboratorFault> {
        let inner = self.inner.fit(train, validation, min_inference_prefix)?;
        Ok(Box::new(Counted {
            inner,
            replications: Arc::clone(&self.replications),
        }))
    }
}

fn corpus(world: &Corridor) -> Vec<Demonstration<ObjectState>> {
    [4, 4, 4, 4, 3, 3]
        .into_iter()
        .map(|len| world.demonstration(len).unwrap())
        .collect()
}

fn stages(report: &CollectionReport) -> Vec<usize> {
    report.stages.iter().map(|s| s.stage).collect()
}

#[test]
fn curriculum_runs_end_to_end_with_snapshots() {
    init_logging();
    let root = tempfile::tempdir().unwrap();
    let world = Corridor::default();
    let config = CollectionConfig {
        num_workers: 3,
        datapoints_per_stage: 6,
        validation_fraction: 0.5,
        snapshot_dir: Some(root.path().to_path_buf()),
        ..CollectionConfig::default()
    };
    let mut trainer = CountingTrainer::default();

    let collection = collect(corpus(&world), world.simulator(), &mut trainer, &config).unwrap();

    assert_eq!(stages(&collection.report), [3, 2, 1]);
    assert_eq!(trainer.inner.fitted_prefixes, [3, 2, 1]);
    // Stage 3 used the stand-in; stages 2 and 1 replicated per worker.
    assert_eq!(trainer.replications.load(Ordering::SeqCst), 2 * config.num_workers);
    assert!(collection.report.total_searches() > 0);

    for report in &collection.report.stages {
        assert_eq!(report.snapshot.as_deref(), Some(stage_dir(root.path(), report.stage).as_path()));
        assert!(report.selected_train + report.selected_validation <= config.datapoints_per_stage);
    }

    let last = read_stage_snapshot::<ObjectState>(&stage_dir(root.path(), 1)).unwrap();
    assert_eq!(last.manifest.stage, 1);
    assert_eq!(last.train.digest().unwrap(), collection.train.digest().unwrap());
    assert_eq!(last.validation.digest().unwrap(), collection.validation.digest().unwrap());
    let fitted: FuelMargin = serde_json::from_slice(&last.classifier.unwrap()).unwrap();
    assert_eq!(fitted.min_prefix, 1);

    let earlier = read_stage_snapshot::<ObjectState>(&stage_dir(root.path(), 3)).unwrap();
    assert!(earlier.train.num_positive_datapoints() <= collection.train.num_positive_datapoints());

    for datapoint in collection.train.iter().chain(collection.validation.iter()) {
        let states = &datapoint.datapoint.states;
        assert!(!states.is_empty());
        assert!(states.len() <= datapoint.datapoint.skeleton.len() + 1);
    }
}

#[test]
fn validation_free_run_fills_only_the_training_set() {
    init_logging();
    let world = Corridor::default();
    let config = CollectionConfig {
        num_workers: 2,
        datapoints_per_stage: 4,
        validation_fraction: 0.0,
        ..CollectionConfig::default()
    };
    let mut trainer = FuelMarginTrainer::default();

    let collection = collect(corpus(&world), world.simulator(), &mut trainer, &config).unwrap();

    for report in &collection.report.stages {
        assert_eq!(report.selected_validation, 0);
    }
    // The first stage searches unpruned, so the corridor refines there.
    assert!(collection.report.stages[0].num_successes > 0);
    assert!(collection.train.num_positive_datapoints() > 0);
    assert!(collection.validation.is_empty());
    assert!(collection.classifier.is_some());
}
