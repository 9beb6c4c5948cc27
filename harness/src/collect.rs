//! Curriculum data collection.
//!
//! # Pipeline
//!
//! ```text
//! partition_corpus() → for p in (1..max_len).rev():
//!   select_for_stage() → ReplicaMap::build()
//!   → [search() × quota on the worker pool] → label → fold
//!   → ClassifierTrainer::fit(min_inference_prefix = p)
//!   → write_stage_snapshot()
//! ```
//!
//! The worker pool is a barrier: a stage's results are folded only after
//! every search of the stage has returned, in job order, so the datasets do
//! not depend on worker scheduling.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sieve_kernel::model::{Skeleton, WorldState};
use sieve_search::classifier::FeasibilityClassifier;
use sieve_search::contract::{Collaborators, OptionModel, Sampler, SymbolicAbstraction};
use sieve_search::error::{CollaboratorFault, InvalidSearch, SearchError};
use sieve_search::metrics::SearchMetrics;
use sieve_search::policy::{Deadline, StopPolicy};
use sieve_search::search::{search, SearchProblem};
use sieve_search::tree::BacktrackingTree;
use thiserror::Error;
use tracing::{info, info_span, warn, Span};

use crate::config::{CollectionConfig, ConfigError};
use crate::corpus::{
    eligible_indices, max_skeleton_length, partition_corpus, select_for_stage, validation_share, Demonstration,
};
use crate::dataset::{DatasetError, FeasibilityDataset};
use crate::replica::{ClassifierTrainer, ReplicaMap, TrainedClassifier};
use crate::snapshot::{write_stage_snapshot, SnapshotError};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("stage {stage}: malformed search input: {source}")]
    InvalidSearch {
        stage: usize,
        #[source]
        source: InvalidSearch,
    },
    #[error("stage {stage}: {fault}")]
    Collaborator { stage: usize, fault: CollaboratorFault },
    #[error("stage {stage}: search interrupted")]
    Interrupted { stage: usize },
    #[error("stage {stage}: classifier training failed: {fault}")]
    Training { stage: usize, fault: CollaboratorFault },
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl CollectError {
    fn from_search<S: std::fmt::Debug>(stage: usize, err: SearchError<S>) -> Self {
        match err {
            SearchError::Invalid(source) => Self::InvalidSearch { stage, source },
            SearchError::Collaborator { fault, .. } => Self::Collaborator { stage, fault },
            SearchError::DeadlineExceeded(_) => Self::Interrupted { stage },
        }
    }
}

/// The world-side collaborators shared by every worker. Each worker pairs
/// them with its own classifier replica.
pub struct Simulator<'a, S: WorldState> {
    pub option_model: &'a dyn OptionModel<S>,
    pub sampler: &'a dyn Sampler<S>,
    pub abstraction: &'a dyn SymbolicAbstraction<S>,
}

impl<S: WorldState> Clone for Simulator<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: WorldState> Copy for Simulator<'_, S> {}

impl<'a, S: WorldState> Simulator<'a, S> {
    #[must_use]
    pub fn with_classifier(self, classifier: &'a dyn FeasibilityClassifier<S>) -> Collaborators<'a, S> {
        Collaborators {
            option_model: self.option_model,
            sampler: self.sampler,
            abstraction: self.abstraction,
            classifier,
        }
    }
}

/// Which dataset a search feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Validation,
}

/// Datapoints newly added to one dataset during a stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldCounts {
    pub positives: usize,
    pub negatives: usize,
    pub augmentations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: usize,
    pub eligible_train: usize,
    pub eligible_validation: usize,
    pub selected_train: usize,
    pub selected_validation: usize,
    pub num_successes: usize,
    pub train: FoldCounts,
    pub validation: FoldCounts,
    pub metrics: SearchMetrics,
    pub duration: Duration,
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    /// In execution order, longest prefix first.
    pub stages: Vec<StageReport>,
}

impl CollectionReport {
    #[must_use]
    pub fn total_searches(&self) -> usize {
        self.stages.iter().map(|s| s.selected_train + s.selected_validation).sum()
    }

    #[must_use]
    pub fn metrics(&self) -> SearchMetrics {
        let mut total = SearchMetrics::default();
        for stage in &self.stages {
            total.merge(&stage.metrics);
        }
        total
    }
}

/// Everything a collection run produces.
pub struct Collection<S: WorldState> {
    pub train: FeasibilityDataset<S>,
    pub validation: FeasibilityDataset<S>,
    /// The classifier fitted after the last stage; `None` if no stage ran.
    pub classifier: Option<Box<dyn TrainedClassifier<S>>>,
    pub report: CollectionReport,
}

/// Partition `corpus` with the configured validation fraction and shuffle
/// seed, then run [`collect_partitioned`].
///
/// # Errors
///
/// See [`collect_partitioned`].
pub fn collect<S: WorldState + Serialize>(
    corpus: Vec<Demonstration<S>>,
    simulator: Simulator<'_, S>,
    trainer: &mut dyn ClassifierTrainer<S>,
    config: &CollectionConfig,
) -> Result<Collection<S>, CollectError> {
    let (train, validation) = partition_corpus(corpus, config.validation_fraction, config.shuffle_seed);
    collect_partitioned(&train, &validation, simulator, trainer, config)
}

/// Run the curriculum over already-partitioned corpora.
///
/// # Errors
///
/// - [`CollectError::Config`] before any work if `config` is invalid.
/// - [`CollectError::Collaborator`] if any search of a stage hits a
///   collaborator fault; the stage is not folded.
/// - [`CollectError::Training`] if the trainer fails.
/// - [`CollectError::Snapshot`] if a snapshot cannot be written.
pub fn collect_partitioned<S: WorldState + Serialize>(
    train_pool: &[Demonstration<S>],
    validation_pool: &[Demonstration<S>],
    simulator: Simulator<'_, S>,
    trainer: &mut dyn ClassifierTrainer<S>,
    config: &CollectionConfig,
) -> Result<Collection<S>, CollectError> {
    config.validate()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_workers)
        .thread_name(|i| format!("sieve-collect-{i}"))
        .build()?;

    let max_len = max_skeleton_length(train_pool).max(max_skeleton_length(validation_pool));
    let validation_quota = validation_share(config.datapoints_per_stage, config.validation_fraction);
    let train_quota = config.datapoints_per_stage - validation_quota;
    info!(
        train_pool = train_pool.len(),
        validation_pool = validation_pool.len(),
        max_len,
        num_workers = config.num_workers,
        "collection started"
    );

    let mut collection = Collection {
        train: FeasibilityDataset::new(),
        validation: FeasibilityDataset::new(),
        classifier: None,
        report: CollectionReport::default(),
    };
    let mut rng = StdRng::seed_from_u64(config.shuffle_seed);
    let mut seed = config.base_seed;

    for stage in (1..max_len).rev() {
        let span = info_span!("stage", stage);
        let _guard = span.enter();
        let started = Instant::now();

        let train_jobs = select_for_stage(train_pool, stage, train_quota, &mut rng);
        let validation_jobs = select_for_stage(validation_pool, stage, validation_quota, &mut rng);
        let mut report = StageReport {
            stage,
            eligible_train: eligible_indices(train_pool, stage).len(),
            eligible_validation: eligible_indices(validation_pool, stage).len(),
            selected_train: train_jobs.len(),
            selected_validation: validation_jobs.len(),
            num_successes: 0,
            train: FoldCounts::default(),
            validation: FoldCounts::default(),
            metrics: SearchMetrics::default(),
            duration: Duration::ZERO,
            snapshot: None,
        };
        info!(
            eligible_train = report.eligible_train,
            eligible_validation = report.eligible_validation,
            selected_train = report.selected_train,
            selected_validation = report.selected_validation,
            "stage started"
        );

        let jobs: Vec<Job<'_, S>> = train_jobs
            .into_iter()
            .enumerate()
            .map(|(i, demo)| Job {
                demo,
                split: Split::Train,
                seed: seed.wrapping_add(i as u64),
            })
            .chain(validation_jobs.into_iter().enumerate().map(|(i, demo)| Job {
                demo,
                split: Split::Validation,
                seed: seed
                    .wrapping_add(config.validation_seed_offset)
                    .wrapping_add(i as u64),
            }))
            .collect();

        let replicas = ReplicaMap::build(collection.classifier.as_deref(), config.num_workers, &config.devices);
        let results = pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    let worker_id = rayon::current_thread_index().unwrap_or(0);
                    job.run(stage, worker_id, &replicas, simulator, config, &span)
                })
                .collect::<Result<Vec<_>, CollectError>>()
        })?;

        collection.train.enter_stage(stage);
        collection.validation.enter_stage(stage);
        for labels in results {
            report.metrics.merge(&labels.metrics);
            report.num_successes += usize::from(labels.augmentation.is_some());
            let (dataset, counts) = match labels.split {
                Split::Train => (&mut collection.train, &mut report.train),
                Split::Validation => (&mut collection.validation, &mut report.validation),
            };
            labels.fold_into(dataset, counts)?;
        }

        let trained = trainer
            .fit(&collection.train, &collection.validation, stage)
            .map_err(|fault| CollectError::Training { stage, fault })?;
        if let Some(dir) = &config.snapshot_dir {
            let blob = trained
                .snapshot()
                .map_err(|fault| CollectError::Training { stage, fault })?;
            let path = write_stage_snapshot(
                dir,
                stage,
                &collection.train,
                &collection.validation,
                Some(&blob),
                &config.search,
            )?;
            info!(path = %path.display(), "stage snapshot written");
            report.snapshot = Some(path);
        }
        collection.classifier = Some(trained);

        report.duration = started.elapsed();
        info!(
            new_train_positives = report.train.positives,
            new_train_negatives = report.train.negatives,
            new_validation_positives = report.validation.positives,
            new_validation_negatives = report.validation.negatives,
            num_successes = report.num_successes,
            duration_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "stage finished"
        );
        if report.selected_train + report.selected_validation == 0 {
            warn!("no eligible demonstrations; stage added no datapoints");
        }
        collection.report.stages.push(report);
        seed = seed.wrapping_add(config.seed_stride());
    }

    info!(
        train_positives = collection.train.num_positive_datapoints(),
        train_negatives = collection.train.num_negative_datapoints(),
        validation_positives = collection.validation.num_positive_datapoints(),
        validation_negatives = collection.validation.num_negative_datapoints(),
        "collection finished"
    );
    Ok(collection)
}

struct Job<'a, S> {
    demo: &'a Demonstration<S>,
    split: Split,
    seed: u64,
}

impl<S: WorldState> Job<'_, S> {
    fn run(
        &self,
        stage: usize,
        worker_id: usize,
        replicas: &ReplicaMap<S>,
        simulator: Simulator<'_, S>,
        config: &CollectionConfig,
        parent: &Span,
    ) -> Result<StageLabels<S>, CollectError> {
        let span = info_span!(parent: parent, "worker_search", worker_id, seed = self.seed, split = ?self.split);
        let _guard = span.enter();

        let prefix = self.demo.prefix(stage);
        let problem = SearchProblem {
            initial_states: prefix,
            skeleton: &self.demo.skeleton,
            atoms_sequence: &self.demo.atoms_sequence,
            max_horizon: self.demo.remaining_horizon(config.horizon, stage),
        };
        let collaborators = simulator.with_classifier(replicas.replica(worker_id));
        let outcome = search(
            &problem,
            collaborators,
            &config.search,
            &StopPolicy::DataGeneration { prefix_length: stage },
            self.seed,
            Deadline::Never,
        )
        .map_err(|err| CollectError::from_search(stage, err))?;

        Ok(StageLabels::from_tree(
            self.split,
            &self.demo.skeleton,
            prefix,
            &outcome.tree,
            outcome.metrics,
        ))
    }
}

/// Labeled prefixes extracted from one data-generation search.
struct StageLabels<'a, S> {
    split: Split,
    skeleton: &'a Skeleton,
    positives: Vec<Vec<S>>,
    negatives: Vec<Vec<S>>,
    augmentation: Option<Vec<S>>,
    metrics: SearchMetrics,
}

impl<'a, S: WorldState> StageLabels<'a, S> {
    /// Positives: the prefix extended by each successful child of the root.
    /// Negatives: the prefix extended by each simulated failed child.
    /// Augmentation: the prefix extended by the whole successful trajectory.
    fn from_tree(
        split: Split,
        skeleton: &'a Skeleton,
        prefix: &[S],
        root: &BacktrackingTree<S>,
        metrics: SearchMetrics,
    ) -> Self {
        let extend = |state: &S| {
            let mut states = prefix.to_vec();
            states.push(state.clone());
            states
        };
        let positives = root.successful_tries.iter().map(|t| extend(&t.child.state)).collect();
        let negatives = root
            .failed_tries
            .iter()
            .filter_map(|t| t.child.as_ref())
            .map(|child| extend(&child.state))
            .collect();
        let augmentation = root.successful_trajectory().map(|trajectory| {
            let mut states = prefix.to_vec();
            states.extend(trajectory.states.into_iter().skip(1));
            states
        });
        Self {
            split,
            skeleton,
            positives,
            negatives,
            augmentation,
            metrics,
        }
    }

    fn fold_into(self, dataset: &mut FeasibilityDataset<S>, counts: &mut FoldCounts) -> Result<(), DatasetError> {
        for states in self.positives {
            counts.positives += usize::from(dataset.add_positive(self.skeleton, states)?);
        }
        for states in self.negatives {
            counts.negatives += usize::from(dataset.add_negative(self.skeleton, states)?);
        }
        if let Some(states) = self.augmentation {
            counts.augmentations += usize::from(dataset.add_augmentation(self.skeleton, states)?);
        }
        Ok(())
    }
}
