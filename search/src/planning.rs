//! Planning loop: refine the task planner's candidate skeletons one at a
//! time under a shared wall-clock deadline until one succeeds.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sieve_kernel::model::{AtomsSequence, Skeleton, WorldState};
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::contract::Collaborators;
use crate::error::{CollaboratorFault, InvalidSearch, SearchError};
use crate::metrics::SearchMetrics;
use crate::policy::{Deadline, SearchConfig, StopPolicy};
use crate::search::{search, SearchOutcome, SearchProblem};
use crate::tree::Trajectory;

/// One skeleton proposed by the task planner, with its expected atoms and
/// whatever counters the planner chose to report.
#[derive(Debug, Clone)]
pub struct CandidateSkeleton {
    pub skeleton: Skeleton,
    pub atoms_sequence: AtomsSequence,
    pub planner_metrics: BTreeMap<String, u64>,
}

/// Failure raised by the task planner itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    #[error("task planner timed out: {detail}")]
    Timeout { detail: String },
    #[error("task planner failed: {detail}")]
    Failed { detail: String },
}

/// Budget for one planning episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub search: SearchConfig,
    /// Candidate skeletons refined before giving up.
    pub max_skeletons_optimized: usize,
    /// Primitive actions available to a full refinement.
    pub max_horizon: usize,
}

impl PlanningConfig {
    /// # Errors
    ///
    /// Returns [`InvalidSearch::Config`] if the embedded search config is
    /// invalid or no skeleton may be optimized.
    pub fn validate(&self) -> Result<(), InvalidSearch> {
        self.search.validate()?;
        if self.max_skeletons_optimized == 0 {
            return Err(InvalidSearch::Config {
                detail: "max_skeletons_optimized must be > 0".into(),
            });
        }
        Ok(())
    }
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            max_skeletons_optimized: 8,
            max_horizon: 400,
        }
    }
}

/// Best partial refinement of one skeleton that did not succeed.
#[derive(Debug, Clone)]
pub struct PartialRefinement<S> {
    pub skeleton: Skeleton,
    pub trajectory: Trajectory<S>,
}

/// Counters for a whole planning episode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningMetrics {
    pub search: SearchMetrics,
    pub num_skeletons_optimized: usize,
    /// Planner counters of the last candidate received.
    pub planner: BTreeMap<String, u64>,
}

/// A refined plan.
#[derive(Debug, Clone)]
pub struct Plan<S> {
    pub skeleton: Skeleton,
    pub trajectory: Trajectory<S>,
    pub metrics: PlanningMetrics,
}

/// Why a planning episode produced no plan. Every variant carries the
/// partial refinements gathered so far.
#[derive(Debug, Error)]
pub enum PlanningError<S: fmt::Debug> {
    #[error(transparent)]
    Invalid(#[from] InvalidSearch),
    #[error("planning timed out after {} skeletons", .metrics.num_skeletons_optimized)]
    Timeout {
        partial_refinements: Vec<PartialRefinement<S>>,
        metrics: PlanningMetrics,
        /// The task planner's own report when it was the one that timed out.
        planner_detail: Option<String>,
    },
    #[error("no skeleton refined after {} attempts", .metrics.num_skeletons_optimized)]
    AllSkeletonsExhausted {
        partial_refinements: Vec<PartialRefinement<S>>,
        metrics: PlanningMetrics,
    },
    #[error("planning aborted: {fault}")]
    Collaborator {
        #[source]
        fault: CollaboratorFault,
        partial_refinements: Vec<PartialRefinement<S>>,
        metrics: PlanningMetrics,
    },
    #[error("planning aborted: {error}")]
    Planner {
        #[source]
        error: PlannerError,
        partial_refinements: Vec<PartialRefinement<S>>,
        metrics: PlanningMetrics,
    },
}

impl<S: fmt::Debug> PlanningError<S> {
    #[must_use]
    pub fn partial_refinements(&self) -> &[PartialRefinement<S>] {
        match self {
            Self::Invalid(_) => &[],
            Self::Timeout {
                partial_refinements,
                ..
            }
            | Self::AllSkeletonsExhausted {
                partial_refinements,
                ..
            }
            | Self::Collaborator {
                partial_refinements,
                ..
            }
            | Self::Planner {
                partial_refinements,
                ..
            } => partial_refinements,
        }
    }
}

/// Refine one skeleton from `initial_state`, stopping each node at its first
/// success.
///
/// # Errors
///
/// See [`search`].
pub fn refine<S: WorldState>(
    initial_state: &S,
    skeleton: &Skeleton,
    atoms_sequence: &AtomsSequence,
    collaborators: Collaborators<'_, S>,
    config: &PlanningConfig,
    seed: u64,
    deadline: Deadline,
) -> Result<SearchOutcome<S>, SearchError<S>> {
    let initial_states = std::slice::from_ref(initial_state);
    let problem = SearchProblem {
        initial_states,
        skeleton,
        atoms_sequence,
        max_horizon: config.max_horizon,
    };
    search(
        &problem,
        collaborators,
        &config.search,
        &StopPolicy::FirstSuccess,
        seed,
        deadline,
    )
}

/// Consume the planner's stream until a skeleton refines, the deadline
/// elapses, or `max_skeletons_optimized` candidates have failed.
///
/// # Errors
///
/// Returns [`PlanningError`] carrying one [`PartialRefinement`] per skeleton
/// whose search produced a tree.
pub fn refine_skeletons<S, P>(
    initial_state: &S,
    planner: P,
    collaborators: Collaborators<'_, S>,
    config: &PlanningConfig,
    seed: u64,
    deadline: Deadline,
) -> Result<Plan<S>, PlanningError<S>>
where
    S: WorldState,
    P: IntoIterator<Item = Result<CandidateSkeleton, PlannerError>>,
{
    config.validate()?;
    let span = info_span!("refine_skeletons", seed, max = config.max_skeletons_optimized);
    let _guard = span.enter();

    let mut partial_refinements = Vec::new();
    let mut metrics = PlanningMetrics::default();
    let mut candidates = planner.into_iter();

    while metrics.num_skeletons_optimized < config.max_skeletons_optimized {
        if deadline.is_expired() {
            warn!(num_skeletons = metrics.num_skeletons_optimized, "planning deadline exceeded");
            return Err(PlanningError::Timeout {
                partial_refinements,
                metrics,
                planner_detail: None,
            });
        }
        let candidate = match candidates.next() {
            None => break,
            Some(Ok(candidate)) => candidate,
            Some(Err(PlannerError::Timeout { detail })) => {
                warn!(%detail, "task planner timed out");
                return Err(PlanningError::Timeout {
                    partial_refinements,
                    metrics,
                    planner_detail: Some(detail),
                });
            }
            Some(Err(error)) => {
                return Err(PlanningError::Planner {
                    error,
                    partial_refinements,
                    metrics,
                });
            }
        };
        metrics.num_skeletons_optimized += 1;
        metrics.planner = candidate.planner_metrics;

        let refined = refine(
            initial_state,
            &candidate.skeleton,
            &candidate.atoms_sequence,
            collaborators,
            config,
            seed,
            deadline,
        );
        match refined {
            Ok(outcome) => {
                metrics.search.merge(&outcome.metrics);
                if let Some(trajectory) = outcome.tree.successful_trajectory() {
                    info!(
                        num_skeletons = metrics.num_skeletons_optimized,
                        num_steps = candidate.skeleton.len(),
                        "skeleton refined"
                    );
                    return Ok(Plan {
                        skeleton: candidate.skeleton,
                        trajectory,
                        metrics,
                    });
                }
                debug!(skeleton = ?candidate.skeleton.names(), "skeleton exhausted");
                partial_refinements.push(PartialRefinement {
                    trajectory: outcome.tree.longest_failure(),
                    skeleton: candidate.skeleton,
                });
            }
            Err(SearchError::Invalid(invalid)) => return Err(PlanningError::Invalid(invalid)),
            Err(SearchError::DeadlineExceeded(partial)) => {
                metrics.search.merge(&partial.metrics);
                partial_refinements.push(PartialRefinement {
                    trajectory: partial.tree.longest_failure(),
                    skeleton: candidate.skeleton,
                });
                return Err(PlanningError::Timeout {
                    partial_refinements,
                    metrics,
                    planner_detail: None,
                });
            }
            Err(SearchError::Collaborator { fault, partial }) => {
                metrics.search.merge(&partial.metrics);
                partial_refinements.push(PartialRefinement {
                    trajectory: partial.tree.longest_failure(),
                    skeleton: candidate.skeleton,
                });
                return Err(PlanningError::Collaborator {
                    fault,
                    partial_refinements,
                    metrics,
                });
            }
        }
    }

    Err(PlanningError::AllSkeletonsExhausted {
        partial_refinements,
        metrics,
    })
}
