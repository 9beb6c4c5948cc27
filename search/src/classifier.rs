//! Feasibility classification: the pruning capability.
//!
//! A classifier is a single-method capability. The engine asks it whether a
//! partial refinement can still be completed before paying for simulation.
//! [`AlwaysAccept`] is the default when no model has been trained.

use sieve_kernel::model::{Parameterization, Skeleton, WorldState};

use crate::error::CollaboratorFault;

/// One classification request.
///
/// `states` is the simulated prefix: the initial state plus one state per
/// refined step. `pending` is a sampled but not yet simulated
/// parameterization for the next step, when the engine asks before
/// simulating. Implementations must accept both forms.
#[derive(Debug)]
pub struct FeasibilityQuery<'a, S> {
    pub states: &'a [S],
    pub skeleton: &'a Skeleton,
    pub pending: Option<&'a Parameterization>,
}

impl<S> FeasibilityQuery<'_, S> {
    /// Number of skeleton steps covered by the query, counting the pending one.
    #[must_use]
    pub fn prefix_length(&self) -> usize {
        self.states.len().saturating_sub(1) + usize::from(self.pending.is_some())
    }

    /// Whether the query covers the whole skeleton (nothing left to judge).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.prefix_length() >= self.skeleton.len()
    }
}

/// Accept/reject decision with the classifier's confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub accept: bool,
    pub confidence: f64,
}

impl Verdict {
    #[must_use]
    pub const fn accept(confidence: f64) -> Self {
        Self {
            accept: true,
            confidence,
        }
    }

    #[must_use]
    pub const fn reject(confidence: f64) -> Self {
        Self {
            accept: false,
            confidence,
        }
    }
}

/// Prefix lengths at which a classifier may be queried (inclusive bounds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceWindow {
    pub min_prefix: usize,
    pub max_prefix: Option<usize>,
}

impl InferenceWindow {
    /// Every prefix length.
    pub const ALL: Self = Self {
        min_prefix: 0,
        max_prefix: None,
    };

    /// Prefix lengths `>= min_prefix`.
    #[must_use]
    pub const fn from(min_prefix: usize) -> Self {
        Self {
            min_prefix,
            max_prefix: None,
        }
    }

    #[must_use]
    pub fn contains(&self, prefix_length: usize) -> bool {
        prefix_length >= self.min_prefix && self.max_prefix.map_or(true, |max| prefix_length <= max)
    }
}

/// The pruning capability consulted by the search engine.
pub trait FeasibilityClassifier<S: WorldState>: Send + Sync {
    /// Judge whether the queried prefix can be refined to the end of the skeleton.
    fn classify(&self, query: &FeasibilityQuery<'_, S>) -> Result<Verdict, CollaboratorFault>;

    /// Prefix lengths at which this classifier is trusted. Outside the
    /// window the engine does not call [`FeasibilityClassifier::classify`].
    fn inference_window(&self) -> InferenceWindow {
        InferenceWindow::ALL
    }

    /// Short identifier for logs.
    fn name(&self) -> &str;
}

/// Accepts everything with full confidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAccept;

impl<S: WorldState> FeasibilityClassifier<S> for AlwaysAccept {
    fn classify(&self, _query: &FeasibilityQuery<'_, S>) -> Result<Verdict, CollaboratorFault> {
        Ok(Verdict::accept(1.0))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "always_accept"
    }
}
