//! The backtracking tree: the owned record of one search attempt over one
//! skeleton.
//!
//! Each node owns its children outright. Every try made at a node lands in
//! exactly one of `successful_tries` or `failed_tries`, so
//! `successful_tries.len() + failed_tries.len() == num_tries` holds for every
//! node the engine builds.

use sieve_kernel::model::{Parameterization, WorldState};

/// A try whose child reached the end of the skeleton.
#[derive(Debug, Clone)]
pub struct SuccessfulTry<S> {
    pub try_index: usize,
    pub parameterization: Parameterization,
    pub child: BacktrackingTree<S>,
    /// Primitive actions consumed by simulating this step.
    pub num_actions: usize,
}

/// Why a try failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailureReason {
    /// The classifier rejected the sample before simulation.
    Pruned { confidence: f64 },
    /// The option model could not start the sample in the node's state.
    NotInitiable,
    /// Simulating the step overran the horizon along this path.
    HorizonExceeded,
    /// The simulated state did not satisfy the expected atoms.
    ExpectedAtomsMismatch,
    /// An object the step does not involve moved beyond tolerance.
    StaticObjectChanged,
    /// The child was expanded and no path below it succeeded.
    SubtreeExhausted,
    /// The deadline elapsed or a collaborator faulted while the child was
    /// being expanded.
    Interrupted,
    /// A consistent sample found while probing below an inconsistent child.
    /// Recorded, never expanded.
    Unexplored,
}

impl FailureReason {
    /// Whether a try with this reason cost an option-model step.
    #[must_use]
    pub fn was_simulated(&self) -> bool {
        !matches!(self, Self::Pruned { .. } | Self::NotInitiable)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pruned { .. } => "pruned",
            Self::NotInitiable => "not_initiable",
            Self::HorizonExceeded => "horizon_exceeded",
            Self::ExpectedAtomsMismatch => "expected_atoms_mismatch",
            Self::StaticObjectChanged => "static_object_changed",
            Self::SubtreeExhausted => "subtree_exhausted",
            Self::Interrupted => "interrupted",
            Self::Unexplored => "unexplored",
        }
    }
}

/// A try that did not lead to success.
///
/// `child` is `None` exactly when no simulation ran (pruned or not
/// initiable); otherwise it holds the simulated state, expanded or not
/// depending on `reason`.
#[derive(Debug, Clone)]
pub struct FailedTry<S> {
    pub try_index: usize,
    pub parameterization: Parameterization,
    pub child: Option<BacktrackingTree<S>>,
    pub reason: FailureReason,
    pub num_actions: Option<usize>,
}

/// One node of the search.
#[derive(Debug, Clone)]
pub struct BacktrackingTree<S> {
    /// State reached at this node.
    pub state: S,
    /// Absolute skeleton index: the number of steps refined to reach `state`.
    pub depth: usize,
    pub num_tries: usize,
    pub successful_tries: Vec<SuccessfulTry<S>>,
    pub failed_tries: Vec<FailedTry<S>>,
    pub is_successful: bool,
}

/// Aligned states and parameterizations along one root-to-node path.
///
/// `states.len() == parameterizations.len() + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory<S> {
    pub states: Vec<S>,
    pub parameterizations: Vec<Parameterization>,
    pub num_actions: Vec<usize>,
}

impl<S> Trajectory<S> {
    /// Number of refined steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameterizations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameterizations.is_empty()
    }

    #[must_use]
    pub fn total_actions(&self) -> usize {
        self.num_actions.iter().sum()
    }
}

impl<S> BacktrackingTree<S> {
    /// A fresh node. Nodes at `depth >= num_steps` have nothing left to
    /// refine and are successful from the start.
    #[must_use]
    pub fn new(state: S, depth: usize, num_steps: usize) -> Self {
        Self {
            state,
            depth,
            num_tries: 0,
            successful_tries: Vec::new(),
            failed_tries: Vec::new(),
            is_successful: depth >= num_steps,
        }
    }

    pub fn record_success(&mut self, entry: SuccessfulTry<S>) {
        self.num_tries += 1;
        self.is_successful = true;
        self.successful_tries.push(entry);
    }

    pub fn record_failure(&mut self, entry: FailedTry<S>) {
        self.num_tries += 1;
        self.failed_tries.push(entry);
    }

    /// Children that were produced by simulation, successful ones first.
    pub fn simulated_children(&self) -> impl Iterator<Item = &BacktrackingTree<S>> {
        self.successful_tries
            .iter()
            .map(|t| &t.child)
            .chain(self.failed_tries.iter().filter_map(|t| t.child.as_ref()))
    }

    /// Number of failed tries rejected before simulation.
    #[must_use]
    pub fn num_unsimulated(&self) -> usize {
        self.failed_tries.iter().filter(|t| t.child.is_none()).count()
    }

    /// Preorder walk over this node and every descendant.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, S> {
        Iter { stack: vec![self] }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.iter().count()
    }
}

impl<S: Clone> BacktrackingTree<S> {
    /// The path to the end of the skeleton through the earliest successful
    /// try at each node, or `None` if this node is not successful.
    #[must_use]
    pub fn successful_trajectory(&self) -> Option<Trajectory<S>> {
        if !self.is_successful {
            return None;
        }
        let mut trajectory = Trajectory {
            states: vec![self.state.clone()],
            parameterizations: Vec::new(),
            num_actions: Vec::new(),
        };
        let mut node = self;
        while let Some(next) = node.successful_tries.first() {
            trajectory.parameterizations.push(next.parameterization.clone());
            trajectory.num_actions.push(next.num_actions);
            trajectory.states.push(next.child.state.clone());
            node = &next.child;
        }
        Some(trajectory)
    }

    /// The deepest path recorded below this node. Among equally deep paths
    /// the most recent try wins.
    #[must_use]
    pub fn longest_failure(&self) -> Trajectory<S> {
        let mut steps: Vec<(&Parameterization, usize, &S)> = Vec::new();
        let mut node = self;
        while let Some((parameterization, num_actions, child)) = node.deepest_branch() {
            steps.push((parameterization, num_actions, &child.state));
            node = child;
        }
        let mut trajectory = Trajectory {
            states: Vec::with_capacity(steps.len() + 1),
            parameterizations: Vec::with_capacity(steps.len()),
            num_actions: Vec::with_capacity(steps.len()),
        };
        trajectory.states.push(self.state.clone());
        for (parameterization, num_actions, state) in steps {
            trajectory.parameterizations.push(parameterization.clone());
            trajectory.num_actions.push(num_actions);
            trajectory.states.push(state.clone());
        }
        trajectory
    }

    fn deepest_branch(&self) -> Option<(&Parameterization, usize, &BacktrackingTree<S>)> {
        let successes = self
            .successful_tries
            .iter()
            .map(|t| (t.try_index, &t.parameterization, t.num_actions, &t.child));
        let failures = self.failed_tries.iter().filter_map(|t| {
            t.child.as_ref().map(|child| {
                (
                    t.try_index,
                    &t.parameterization,
                    t.num_actions.unwrap_or_default(),
                    child,
                )
            })
        });
        successes
            .chain(failures)
            .max_by_key(|(try_index, _, _, child)| (child.max_depth(), *try_index))
            .map(|(_, parameterization, num_actions, child)| (parameterization, num_actions, child))
    }

    fn max_depth(&self) -> usize {
        self.iter().map(|n| n.depth).max().unwrap_or(self.depth)
    }
}

impl<S: WorldState> BacktrackingTree<S> {
    /// Summary rendering for diagnostics. States appear as fingerprints.
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "depth": self.depth,
            "failed_tries": self.failed_tries.iter().map(failed_try_to_json).collect::<Vec<_>>(),
            "is_successful": self.is_successful,
            "num_tries": self.num_tries,
            "state_fingerprint": self.state.fingerprint().as_str(),
            "successful_tries": self.successful_tries.iter().map(successful_try_to_json).collect::<Vec<_>>(),
        })
    }
}

fn successful_try_to_json<S: WorldState>(t: &SuccessfulTry<S>) -> serde_json::Value {
    serde_json::json!({
        "child": t.child.to_json_value(),
        "num_actions": t.num_actions,
        "parameterization": t.parameterization.values(),
        "try_index": t.try_index,
    })
}

fn failed_try_to_json<S: WorldState>(t: &FailedTry<S>) -> serde_json::Value {
    let mut obj = serde_json::json!({
        "child": t.child.as_ref().map(BacktrackingTree::to_json_value),
        "num_actions": t.num_actions,
        "parameterization": t.parameterization.values(),
        "reason": t.reason.as_str(),
        "try_index": t.try_index,
    });
    if let FailureReason::Pruned { confidence } = t.reason {
        obj["confidence"] = serde_json::json!(confidence);
    }
    obj
}

/// Preorder iterator returned by [`BacktrackingTree::iter`].
pub struct Iter<'a, S> {
    stack: Vec<&'a BacktrackingTree<S>>,
}

impl<'a, S> Iterator for Iter<'a, S> {
    type Item = &'a BacktrackingTree<S>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // Successful children first, then failed ones, each in try order.
        let children: Vec<&BacktrackingTree<S>> = node.simulated_children().collect();
        self.stack.extend(children.into_iter().rev());
        Some(node)
    }
}
