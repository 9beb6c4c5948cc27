//! Search policy types: sample budget, consistency checks, stop conditions
//! and the wall-clock deadline.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::InvalidSearch;
use crate::tree::BacktrackingTree;

/// What to do with a simulated child that fails the consistency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyFailurePolicy {
    /// Record the child and stop: the branch is dead.
    #[default]
    MarkFailed,
    /// Record the child, then expand it with a single sample so the tree
    /// shows what would have followed. The probe never rescues the branch.
    ProbeOneLevel,
}

/// Per-invocation search budget and consistency configuration.
///
/// Immutable once a search starts; each worker receives its own clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Hard cap on sampling attempts per node.
    pub max_samples_per_step: usize,
    /// Check simulated states against the expected atoms.
    pub check_expected_atoms: bool,
    /// Reject children in which objects not involved in the step moved.
    pub check_static_object_changes: bool,
    /// Largest tolerated change for uninvolved objects.
    pub static_object_change_tol: f64,
    pub on_consistency_failure: ConsistencyFailurePolicy,
}

impl SearchConfig {
    /// # Errors
    ///
    /// Returns [`InvalidSearch::Config`] if the sample budget is zero or the
    /// tolerance is negative or not finite.
    pub fn validate(&self) -> Result<(), InvalidSearch> {
        if self.max_samples_per_step == 0 {
            return Err(InvalidSearch::Config {
                detail: "max_samples_per_step must be > 0".into(),
            });
        }
        if !self.static_object_change_tol.is_finite() || self.static_object_change_tol < 0.0 {
            return Err(InvalidSearch::Config {
                detail: format!(
                    "static_object_change_tol must be finite and >= 0, got {}",
                    self.static_object_change_tol
                ),
            });
        }
        Ok(())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_samples_per_step: 10,
            check_expected_atoms: true,
            check_static_object_changes: false,
            static_object_change_tol: 1e-3,
            on_consistency_failure: ConsistencyFailurePolicy::MarkFailed,
        }
    }
}

/// Caller-supplied predicate consulted before every sample at a node.
///
/// The sample budget is enforced by the engine regardless; a stop
/// condition can only end exploration of a node earlier.
pub trait StopCondition<S>: Sync {
    fn should_stop(&self, depth: usize, node: &BacktrackingTree<S>) -> bool;
}

impl<S, F> StopCondition<S> for F
where
    F: Fn(usize, &BacktrackingTree<S>) -> bool + Sync,
{
    fn should_stop(&self, depth: usize, node: &BacktrackingTree<S>) -> bool {
        self(depth, node)
    }
}

/// The standard stop conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Stop a node once it has a successful child. Used at planning time.
    FirstSuccess,
    /// Data generation at a curriculum stage. Above `prefix_length` a node
    /// also stops once it has any simulated child, so one informative
    /// sample exists at each shallow level before going deeper.
    DataGeneration { prefix_length: usize },
    /// Never stop early; spend the whole sample budget at every node.
    Exhaustive,
}

impl<S> StopCondition<S> for StopPolicy {
    fn should_stop(&self, depth: usize, node: &BacktrackingTree<S>) -> bool {
        match *self {
            Self::FirstSuccess => node.is_successful,
            Self::DataGeneration { prefix_length } => {
                if depth < prefix_length {
                    node.is_successful || node.simulated_children().next().is_some()
                } else {
                    node.is_successful
                }
            }
            Self::Exhaustive => false,
        }
    }
}

/// Wall-clock deadline threaded through a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Data generation: bounded by budgets only.
    Never,
    At(Instant),
}

impl Deadline {
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Instant::now().checked_add(timeout).map_or(Self::Never, Self::At)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self {
            Self::Never => false,
            Self::At(at) => Instant::now() >= *at,
        }
    }

    /// Time left, or `None` for [`Deadline::Never`].
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::At(at) => Some(at.saturating_duration_since(Instant::now())),
        }
    }
}
