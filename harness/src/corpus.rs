//! Demonstration corpus: the refinements data generation starts from.
//!
//! At curriculum stage `p` a demonstration contributes its first `p` states
//! as the fixed prefix; the search then refines the remaining steps.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sieve_kernel::model::{AtomsSequence, ModelError, Skeleton, WorldState};

/// A successful low-level refinement of one skeleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Demonstration<S> {
    /// States before each step and after the last (`skeleton.len() + 1`).
    pub states: Vec<S>,
    pub atoms_sequence: AtomsSequence,
    pub skeleton: Skeleton,
    /// Primitive actions consumed by each demonstrated step.
    pub step_action_counts: Vec<usize>,
}

impl<S: WorldState> Demonstration<S> {
    /// # Errors
    ///
    /// Returns [`ModelError`] unless states, atoms and action counts all
    /// align with the skeleton.
    pub fn new(
        states: Vec<S>,
        atoms_sequence: AtomsSequence,
        skeleton: Skeleton,
        step_action_counts: Vec<usize>,
    ) -> Result<Self, ModelError> {
        atoms_sequence.check_against(&skeleton)?;
        if states.len() != skeleton.len() + 1 || step_action_counts.len() != skeleton.len() {
            return Err(ModelError::DemonstrationMisaligned {
                steps: skeleton.len(),
                states: states.len(),
                action_counts: step_action_counts.len(),
            });
        }
        Ok(Self {
            states,
            atoms_sequence,
            skeleton,
            step_action_counts,
        })
    }
}

impl<S> Demonstration<S> {
    /// Eligible at stage `p` iff the skeleton has steps left to refine past
    /// a prefix of `p` states.
    #[must_use]
    pub fn is_eligible(&self, stage: usize) -> bool {
        self.skeleton.len() > stage
    }

    /// The fixed prefix for stage `p`: the first `p` states.
    #[must_use]
    pub fn prefix(&self, stage: usize) -> &[S] {
        &self.states[..stage.min(self.states.len())]
    }

    /// Horizon left below the stage-`p` prefix.
    #[must_use]
    pub fn remaining_horizon(&self, horizon: usize, stage: usize) -> usize {
        let refined = stage.saturating_sub(1).min(self.step_action_counts.len());
        horizon.saturating_sub(self.step_action_counts[..refined].iter().sum())
    }
}

/// Number of items the validation side receives out of `total`.
#[must_use]
pub fn validation_share(total: usize, validation_fraction: f64) -> usize {
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let share = (total as f64 * validation_fraction.clamp(0.0, 1.0)).round() as usize;
    share.min(total)
}

/// Shuffle once with `shuffle_seed`, then split into `(training, validation)`.
#[must_use]
pub fn partition_corpus<S>(
    mut corpus: Vec<Demonstration<S>>,
    validation_fraction: f64,
    shuffle_seed: u64,
) -> (Vec<Demonstration<S>>, Vec<Demonstration<S>>) {
    let mut rng = StdRng::seed_from_u64(shuffle_seed);
    corpus.shuffle(&mut rng);
    let validation_len = validation_share(corpus.len(), validation_fraction);
    let validation = corpus.split_off(corpus.len() - validation_len);
    (corpus, validation)
}

/// Longest skeleton in the corpus.
#[must_use]
pub fn max_skeleton_length<S>(corpus: &[Demonstration<S>]) -> usize {
    corpus.iter().map(|d| d.skeleton.len()).max().unwrap_or(0)
}

/// Indices of demonstrations eligible at `stage`.
#[must_use]
pub fn eligible_indices<S>(pool: &[Demonstration<S>], stage: usize) -> Vec<usize> {
    pool.iter()
        .enumerate()
        .filter(|(_, d)| d.is_eligible(stage))
        .map(|(i, _)| i)
        .collect()
}

/// Sample up to `quota` eligible demonstrations without replacement.
///
/// The quota is clamped to the eligible pool; an empty pool yields nothing.
#[must_use]
pub fn select_for_stage<'a, S>(
    pool: &'a [Demonstration<S>],
    stage: usize,
    quota: usize,
    rng: &mut StdRng,
) -> Vec<&'a Demonstration<S>> {
    let mut eligible = eligible_indices(pool, stage);
    let take = quota.min(eligible.len());
    let (chosen, _) = eligible.partial_shuffle(rng, take);
    chosen.iter().map(|&i| &pool[i]).collect()
}
