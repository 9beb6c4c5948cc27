//! Shared fixtures for the sieve benchmark suites.

use sieve_harness::corpus::Demonstration;
use sieve_harness::dataset::FeasibilityDataset;
use sieve_harness::worlds::corridor::{Corridor, ROBOT};
use sieve_kernel::model::{ObjectState, Skeleton};
use sieve_search::classifier::AlwaysAccept;
use sieve_search::metrics::SearchMetrics;
use sieve_search::policy::{Deadline, SearchConfig, StopPolicy};
use sieve_search::search::{search, SearchProblem};

/// Primitive-action horizon for every benchmark search; generous enough that
/// it never binds.
pub const HORIZON: usize = 1_000;

/// A corridor demonstration of `len` steps, built once per benchmark.
///
/// # Panics
///
/// Panics if the corridor produces a misaligned walk. Benchmark setup
/// failures are fatal.
#[must_use]
pub fn corridor_demo(world: &Corridor, len: usize) -> Demonstration<ObjectState> {
    world
        .demonstration(len)
        .unwrap_or_else(|e| panic!("corridor demonstration of {len} steps: {e}"))
}

/// One data-generation search at `stage` with no classifier pruning.
///
/// # Panics
///
/// Panics if the search aborts; corridor collaborators never fault.
#[must_use]
pub fn run_stage_search(
    world: &Corridor,
    demo: &Demonstration<ObjectState>,
    stage: usize,
    config: &SearchConfig,
    seed: u64,
) -> SearchMetrics {
    let problem = SearchProblem {
        initial_states: demo.prefix(stage),
        skeleton: &demo.skeleton,
        atoms_sequence: &demo.atoms_sequence,
        max_horizon: demo.remaining_horizon(HORIZON, stage),
    };
    let collaborators = world.simulator().with_classifier(&AlwaysAccept);
    search(
        &problem,
        collaborators,
        config,
        &StopPolicy::DataGeneration { prefix_length: stage },
        seed,
        Deadline::Never,
    )
    .unwrap_or_else(|e| panic!("corridor search aborted: {e}"))
    .metrics
}

/// `count` distinct single-object prefixes of a `steps`-step skeleton.
#[must_use]
pub fn synthetic_prefixes(count: usize, steps: usize) -> Vec<Vec<ObjectState>> {
    (0..count)
        .map(|i| {
            (0..=(i % steps) + 1)
                .map(|k| {
                    #[allow(clippy::cast_precision_loss)]
                    let x = (i * 31 + k) as f64;
                    ObjectState::new().with_object(ROBOT, vec![x, 0.0])
                })
                .collect()
        })
        .collect()
}

/// Fold `prefixes` as positives into a fresh dataset.
///
/// # Panics
///
/// Panics if a prefix is longer than the skeleton allows.
#[must_use]
pub fn fold_positives(skeleton: &Skeleton, prefixes: &[Vec<ObjectState>]) -> FeasibilityDataset<ObjectState> {
    let mut dataset = FeasibilityDataset::new();
    dataset.enter_stage(1);
    for states in prefixes {
        dataset
            .add_positive(skeleton, states.clone())
            .unwrap_or_else(|e| panic!("fold failed: {e}"));
    }
    dataset
}
