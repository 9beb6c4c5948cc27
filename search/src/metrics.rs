//! Search cost counters.

use serde::{Deserialize, Serialize};

/// Counters accumulated over one search (or folded over several).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMetrics {
    /// Parameterizations drawn from the sampler.
    pub num_samples: u64,
    /// Calls into the feasibility classifier.
    pub num_classifier_calls: u64,
    /// Samples rejected by the classifier before simulation.
    pub num_pruned: u64,
    /// Samples the option model reported as not initiable.
    pub num_not_initiable: u64,
    /// Option-model step invocations.
    pub num_simulations: u64,
    /// Simulated children that failed the expected-atoms or static-object check.
    pub num_consistency_failures: u64,
    /// Simulated children whose path overran the horizon.
    pub num_horizon_overruns: u64,
    /// Deepest absolute depth at which a node was created.
    pub max_depth_reached: usize,
}

impl SearchMetrics {
    /// Fold `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        self.num_samples += other.num_samples;
        self.num_classifier_calls += other.num_classifier_calls;
        self.num_pruned += other.num_pruned;
        self.num_not_initiable += other.num_not_initiable;
        self.num_simulations += other.num_simulations;
        self.num_consistency_failures += other.num_consistency_failures;
        self.num_horizon_overruns += other.num_horizon_overruns;
        self.max_depth_reached = self.max_depth_reached.max(other.max_depth_reached);
    }
}
