//! Search entry point and the per-node sampling loop.
//!
//! Depth-first, with a per-node retry budget. At each node the engine draws
//! a sample, asks the classifier (when its window covers the step), checks
//! initiability, simulates, checks the horizon and the expected atoms, then
//! recurses. Every outcome short of an abort is recorded as a try on the
//! node; exhaustion is not an error.

use sieve_kernel::model::{AtomsSequence, GroundOperator, ModelError, Parameterization, Skeleton, WorldState};
use sieve_kernel::seed::derive_sample_seed;
use tracing::{debug, debug_span, warn};

use crate::classifier::FeasibilityQuery;
use crate::contract::Collaborators;
use crate::error::{CollaboratorFault, InvalidSearch, PartialSearch, SearchError};
use crate::metrics::SearchMetrics;
use crate::policy::{ConsistencyFailurePolicy, Deadline, SearchConfig, StopCondition};
use crate::tree::{BacktrackingTree, FailedTry, FailureReason, SuccessfulTry};

/// Inputs that identify one refinement problem.
#[derive(Debug, Clone, Copy)]
pub struct SearchProblem<'a, S> {
    /// States already fixed before the search: the initial state plus any
    /// refined prefix. The root sits at depth `initial_states.len() - 1`.
    pub initial_states: &'a [S],
    pub skeleton: &'a Skeleton,
    pub atoms_sequence: &'a AtomsSequence,
    /// Primitive actions available below the root, counted along each path.
    pub max_horizon: usize,
}

impl<S> SearchProblem<'_, S> {
    /// # Errors
    ///
    /// Returns [`ModelError`] if the atoms sequence does not match the
    /// skeleton or the state prefix is empty or too long.
    pub fn validate(&self) -> Result<(), ModelError> {
        self.atoms_sequence.check_against(self.skeleton)?;
        if self.initial_states.is_empty() {
            return Err(ModelError::EmptyStatePrefix);
        }
        if self.initial_states.len() > self.skeleton.len() + 1 {
            return Err(ModelError::StatePrefixTooLong {
                states: self.initial_states.len(),
                steps: self.skeleton.len(),
            });
        }
        Ok(())
    }
}

/// Result of a search that ran to completion.
#[derive(Debug, Clone)]
pub struct SearchOutcome<S> {
    pub tree: BacktrackingTree<S>,
    pub success: bool,
    pub metrics: SearchMetrics,
}

/// Run the backtracking search over `problem.skeleton`.
///
/// Deterministic given the seed and deterministic collaborators, as long as
/// the deadline does not fire.
///
/// # Errors
///
/// - [`SearchError::Invalid`] before any work if the problem or config is malformed.
/// - [`SearchError::DeadlineExceeded`] if `deadline` elapses mid-search.
/// - [`SearchError::Collaborator`] if a collaborator faults.
///
/// Both aborts carry the tree built so far.
pub fn search<S: WorldState>(
    problem: &SearchProblem<'_, S>,
    collaborators: Collaborators<'_, S>,
    config: &SearchConfig,
    stop: &dyn StopCondition<S>,
    seed: u64,
    deadline: Deadline,
) -> Result<SearchOutcome<S>, SearchError<S>> {
    config.validate()?;
    problem.validate().map_err(InvalidSearch::from)?;

    let num_steps = problem.skeleton.len();
    let root_depth = problem.initial_states.len() - 1;
    let span = debug_span!("search", num_steps, root_depth, seed);
    let _guard = span.enter();

    let mut refiner = Refiner {
        problem,
        collaborators,
        config,
        stop,
        seed,
        deadline,
        path: problem.initial_states.to_vec(),
        try_path: Vec::new(),
        metrics: SearchMetrics {
            max_depth_reached: root_depth,
            ..SearchMetrics::default()
        },
    };
    let mut root = BacktrackingTree::new(
        problem.initial_states[root_depth].clone(),
        root_depth,
        num_steps,
    );
    let result = refiner.expand(&mut root, 0);
    let metrics = refiner.metrics;

    match result {
        Ok(()) => {
            let success = root.is_successful;
            debug!(
                success,
                num_tries = root.num_tries,
                num_samples = metrics.num_samples,
                num_simulations = metrics.num_simulations,
                "search finished"
            );
            Ok(SearchOutcome {
                tree: root,
                success,
                metrics,
            })
        }
        Err(Interrupt::Deadline) => {
            warn!(
                num_samples = metrics.num_samples,
                max_depth_reached = metrics.max_depth_reached,
                "search deadline exceeded"
            );
            Err(SearchError::DeadlineExceeded(Box::new(PartialSearch {
                tree: root,
                metrics,
            })))
        }
        Err(Interrupt::Fault(fault)) => {
            warn!(%fault, "search aborted by collaborator fault");
            Err(SearchError::Collaborator {
                fault,
                partial: Box::new(PartialSearch {
                    tree: root,
                    metrics,
                }),
            })
        }
    }
}

enum Interrupt {
    Deadline,
    Fault(CollaboratorFault),
}

impl From<CollaboratorFault> for Interrupt {
    fn from(fault: CollaboratorFault) -> Self {
        Self::Fault(fault)
    }
}

/// Outcome of one sampling attempt at a node.
enum Attempt<S> {
    /// Failed without producing a child worth expanding.
    Rejected(FailedTry<S>),
    /// Simulated, but the child contradicts the expected atoms or moved a
    /// static object.
    Inconsistent {
        try_index: usize,
        parameterization: Parameterization,
        child: BacktrackingTree<S>,
        num_actions: usize,
        horizon_used: usize,
        reason: FailureReason,
    },
    /// Simulated and consistent: ready to expand.
    Consistent {
        try_index: usize,
        parameterization: Parameterization,
        child: BacktrackingTree<S>,
        num_actions: usize,
        horizon_used: usize,
    },
}

struct Refiner<'a, 'p, S: WorldState> {
    problem: &'a SearchProblem<'p, S>,
    collaborators: Collaborators<'a, S>,
    config: &'a SearchConfig,
    stop: &'a dyn StopCondition<S>,
    seed: u64,
    deadline: Deadline,
    /// States from the initial state down to the node being expanded.
    path: Vec<S>,
    /// Try index taken at each level below the root.
    try_path: Vec<usize>,
    metrics: SearchMetrics,
}

impl<S: WorldState> Refiner<'_, '_, S> {
    fn expand(&mut self, node: &mut BacktrackingTree<S>, horizon_used: usize) -> Result<(), Interrupt> {
        if node.is_successful {
            return Ok(());
        }
        let budget = self.config.max_samples_per_step;
        while node.num_tries < budget && !self.stop.should_stop(node.depth, node) {
            if self.deadline.is_expired() {
                return Err(Interrupt::Deadline);
            }
            match self.attempt(node, horizon_used)? {
                Attempt::Rejected(failed) => node.record_failure(failed),
                Attempt::Inconsistent {
                    try_index,
                    parameterization,
                    mut child,
                    num_actions,
                    horizon_used: child_horizon,
                    reason,
                } => {
                    let probed = match self.config.on_consistency_failure {
                        ConsistencyFailurePolicy::MarkFailed => Ok(()),
                        ConsistencyFailurePolicy::ProbeOneLevel => {
                            self.descend(try_index, &child.state);
                            let probed = self.probe(&mut child, child_horizon);
                            self.ascend();
                            probed
                        }
                    };
                    node.record_failure(FailedTry {
                        try_index,
                        parameterization,
                        child: Some(child),
                        reason,
                        num_actions: Some(num_actions),
                    });
                    probed?;
                }
                Attempt::Consistent {
                    try_index,
                    parameterization,
                    mut child,
                    num_actions,
                    horizon_used: child_horizon,
                } => {
                    self.descend(try_index, &child.state);
                    let expanded = self.expand(&mut child, child_horizon);
                    self.ascend();
                    if let Err(interrupt) = expanded {
                        node.record_failure(FailedTry {
                            try_index,
                            parameterization,
                            child: Some(child),
                            reason: FailureReason::Interrupted,
                            num_actions: Some(num_actions),
                        });
                        return Err(interrupt);
                    }
                    if child.is_successful {
                        node.record_success(SuccessfulTry {
                            try_index,
                            parameterization,
                            child,
                            num_actions,
                        });
                    } else {
                        node.record_failure(FailedTry {
                            try_index,
                            parameterization,
                            child: Some(child),
                            reason: FailureReason::SubtreeExhausted,
                            num_actions: Some(num_actions),
                        });
                    }
                }
            }
        }
        if !node.is_successful {
            debug!(depth = node.depth, num_tries = node.num_tries, "node exhausted");
        }
        Ok(())
    }

    /// One sample below an inconsistent child, recorded but never expanded.
    fn probe(&mut self, node: &mut BacktrackingTree<S>, horizon_used: usize) -> Result<(), Interrupt> {
        if node.is_successful {
            return Ok(());
        }
        if self.deadline.is_expired() {
            return Err(Interrupt::Deadline);
        }
        let failed = match self.attempt(node, horizon_used)? {
            Attempt::Rejected(failed) => failed,
            Attempt::Inconsistent {
                try_index,
                parameterization,
                child,
                num_actions,
                reason,
                ..
            } => FailedTry {
                try_index,
                parameterization,
                child: Some(child),
                reason,
                num_actions: Some(num_actions),
            },
            Attempt::Consistent {
                try_index,
                parameterization,
                child,
                num_actions,
                ..
            } => FailedTry {
                try_index,
                parameterization,
                child: Some(child),
                reason: FailureReason::Unexplored,
                num_actions: Some(num_actions),
            },
        };
        node.record_failure(failed);
        Ok(())
    }

    fn attempt(&mut self, node: &BacktrackingTree<S>, horizon_used: usize) -> Result<Attempt<S>, Interrupt> {
        let depth = node.depth;
        let try_index = node.num_tries;
        let num_steps = self.problem.skeleton.len();
        let operator = &self.problem.skeleton.steps()[depth];
        let collab = self.collaborators;

        let sample_seed = derive_sample_seed(self.seed, depth, &self.try_path, try_index);
        let parameterization = collab.sampler.sample(&node.state, sample_seed, operator)?;
        self.metrics.num_samples += 1;

        let prefix_length = depth + 1;
        if prefix_length < num_steps && collab.classifier.inference_window().contains(prefix_length) {
            self.metrics.num_classifier_calls += 1;
            let verdict = collab.classifier.classify(&FeasibilityQuery {
                states: &self.path,
                skeleton: self.problem.skeleton,
                pending: Some(&parameterization),
            })?;
            if !verdict.accept {
                self.metrics.num_pruned += 1;
                return Ok(Attempt::Rejected(FailedTry {
                    try_index,
                    parameterization,
                    child: None,
                    reason: FailureReason::Pruned {
                        confidence: verdict.confidence,
                    },
                    num_actions: None,
                }));
            }
        }

        if !collab.option_model.initiable(&node.state, operator, &parameterization)? {
            self.metrics.num_not_initiable += 1;
            return Ok(Attempt::Rejected(FailedTry {
                try_index,
                parameterization,
                child: None,
                reason: FailureReason::NotInitiable,
                num_actions: None,
            }));
        }

        let transition = collab.option_model.step(&node.state, operator, &parameterization)?;
        self.metrics.num_simulations += 1;
        let child_depth = depth + 1;
        self.metrics.max_depth_reached = self.metrics.max_depth_reached.max(child_depth);
        let num_actions = transition.num_actions;
        let child = BacktrackingTree::new(transition.next_state, child_depth, num_steps);

        let child_horizon = horizon_used.saturating_add(num_actions);
        if child_horizon > self.problem.max_horizon {
            self.metrics.num_horizon_overruns += 1;
            return Ok(Attempt::Rejected(FailedTry {
                try_index,
                parameterization,
                child: Some(child),
                reason: FailureReason::HorizonExceeded,
                num_actions: Some(num_actions),
            }));
        }

        if let Some(reason) = self.inconsistency(&node.state, &child.state, operator, child_depth) {
            self.metrics.num_consistency_failures += 1;
            return Ok(Attempt::Inconsistent {
                try_index,
                parameterization,
                child,
                num_actions,
                horizon_used: child_horizon,
                reason,
            });
        }

        Ok(Attempt::Consistent {
            try_index,
            parameterization,
            child,
            num_actions,
            horizon_used: child_horizon,
        })
    }

    fn inconsistency(
        &self,
        before: &S,
        after: &S,
        operator: &GroundOperator,
        child_depth: usize,
    ) -> Option<FailureReason> {
        let abstraction = self.collaborators.abstraction;
        if self.config.check_expected_atoms {
            if let Some(expected) = self.problem.atoms_sequence.get(child_depth) {
                if !expected.iter().all(|atom| abstraction.holds(atom, after)) {
                    return Some(FailureReason::ExpectedAtomsMismatch);
                }
            }
        }
        if self.config.check_static_object_changes
            && abstraction.static_object_change(before, after, operator)
                > self.config.static_object_change_tol
        {
            return Some(FailureReason::StaticObjectChanged);
        }
        None
    }

    fn descend(&mut self, try_index: usize, state: &S) {
        self.path.push(state.clone());
        self.try_path.push(try_index);
    }

    fn ascend(&mut self) {
        self.path.pop();
        self.try_path.pop();
    }
}
