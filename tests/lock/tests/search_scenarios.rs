//! End-to-end search scenarios on the scripted line world.
//!
//! Proves:
//! 1. A sampler that succeeds on its second try refines every step with two tries per node
//! 2. A classifier rejecting every root candidate costs zero simulations
//! 3. A deadline elapsing below the root surfaces the partial tree
//! 4. A collaborator fault aborts the search without recording the faulty try
//! 5. The probe policy records one extra level below inconsistent children

use std::sync::Mutex;
use std::time::Duration;

use lock_tests::{
    init_logging, line_collaborators, line_problem, Cell, LineWorld, RejectInWindow, SecondTrySampler, SlowSampler,
};
use sieve_kernel::model::{GroundOperator, Parameterization};
use sieve_search::classifier::{AlwaysAccept, InferenceWindow};
use sieve_search::contract::Sampler;
use sieve_search::error::{CollaboratorFault, CollaboratorKind, SearchError};
use sieve_search::policy::{ConsistencyFailurePolicy, Deadline, SearchConfig, StopPolicy};
use sieve_search::search::{search, SearchProblem};
use sieve_search::tree::FailureReason;

fn config(max_samples_per_step: usize) -> SearchConfig {
    SearchConfig {
        max_samples_per_step,
        ..SearchConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Scenario A: success on the second try at every depth
// ---------------------------------------------------------------------------

#[test]
fn second_try_success_at_every_depth() {
    init_logging();
    let (skeleton, atoms) = line_problem(3);
    let world = LineWorld::new(1);
    let sampler = SecondTrySampler::default();
    let states = [Cell(0)];
    let problem = SearchProblem {
        initial_states: &states,
        skeleton: &skeleton,
        atoms_sequence: &atoms,
        max_horizon: 100,
    };

    let outcome = search(
        &problem,
        line_collaborators(&world, &sampler, &AlwaysAccept),
        &config(5),
        &StopPolicy::FirstSuccess,
        0,
        Deadline::Never,
    )
    .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.tree.num_tries, 2);
    let trajectory = outcome.tree.successful_trajectory().unwrap();
    assert_eq!(trajectory.states.len(), 4);
    assert_eq!(trajectory.states, [Cell(0), Cell(1), Cell(2), Cell(3)]);
    // Each level: one inconsistent stand-still, one success.
    assert_eq!(outcome.metrics.num_simulations, 6);
    assert_eq!(outcome.metrics.num_consistency_failures, 3);
    assert_eq!(world.num_steps(), 6);
}

// ---------------------------------------------------------------------------
// Scenario B: every root candidate pruned
// ---------------------------------------------------------------------------

#[test]
fn rejected_root_candidates_are_never_simulated() {
    init_logging();
    let (skeleton, atoms) = line_problem(2);
    let world = LineWorld::new(1);
    let sampler = SecondTrySampler::default();
    let classifier = RejectInWindow(InferenceWindow {
        min_prefix: 1,
        max_prefix: Some(1),
    });
    let states = [Cell(0)];
    let problem = SearchProblem {
        initial_states: &states,
        skeleton: &skeleton,
        atoms_sequence: &atoms,
        max_horizon: 100,
    };

    let outcome = search(
        &problem,
        line_collaborators(&world, &sampler, &classifier),
        &config(3),
        &StopPolicy::FirstSuccess,
        0,
        Deadline::Never,
    )
    .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.tree.failed_tries.len(), 3);
    assert!(outcome.tree.successful_tries.is_empty());
    for failed in &outcome.tree.failed_tries {
        assert!(failed.child.is_none());
        assert!(matches!(failed.reason, FailureReason::Pruned { .. }));
    }
    assert_eq!(world.num_steps(), 0);
    assert_eq!(outcome.metrics.num_simulations, 0);
    assert_eq!(outcome.metrics.num_pruned, 3);
}

// ---------------------------------------------------------------------------
// Scenario C: deadline elapses below the root
// ---------------------------------------------------------------------------

#[test]
fn deadline_below_root_surfaces_partial_tree() {
    init_logging();
    let (skeleton, atoms) = line_problem(3);
    let world = LineWorld::new(1);
    let sampler = SlowSampler {
        slow_at: 1,
        delay: Duration::from_millis(200),
    };
    let states = [Cell(0)];
    let problem = SearchProblem {
        initial_states: &states,
        skeleton: &skeleton,
        atoms_sequence: &atoms,
        max_horizon: 100,
    };

    let err = search(
        &problem,
        line_collaborators(&world, &sampler, &AlwaysAccept),
        &config(5),
        &StopPolicy::FirstSuccess,
        0,
        Deadline::after(Duration::from_millis(50)),
    )
    .unwrap_err();

    assert!(err.is_deadline());
    let partial = err.partial().unwrap();
    assert!(partial.tree.num_tries >= 1);
    assert_eq!(partial.tree.failed_tries[0].reason, FailureReason::Interrupted);
    assert!(!partial.tree.is_successful);
}

// ---------------------------------------------------------------------------
// Collaborator faults
// ---------------------------------------------------------------------------

struct FailsAtDepthOne;

impl Sampler<Cell> for FailsAtDepthOne {
    fn sample(&self, state: &Cell, _rng_seed: u64, _op: &GroundOperator) -> Result<Parameterization, CollaboratorFault> {
        if state.0 == 1 {
            return Err(CollaboratorFault::new(CollaboratorKind::Sampler, "no grasp found"));
        }
        Ok(Parameterization::new(vec![1.0]))
    }
}

#[test]
fn sampler_fault_aborts_with_partial_tree() {
    init_logging();
    let (skeleton, atoms) = line_problem(3);
    let world = LineWorld::new(1);
    let states = [Cell(0)];
    let problem = SearchProblem {
        initial_states: &states,
        skeleton: &skeleton,
        atoms_sequence: &atoms,
        max_horizon: 100,
    };

    let err = search(
        &problem,
        line_collaborators(&world, &FailsAtDepthOne, &AlwaysAccept),
        &config(5),
        &StopPolicy::FirstSuccess,
        0,
        Deadline::Never,
    )
    .unwrap_err();

    let SearchError::Collaborator { fault, partial } = err else {
        panic!("expected a collaborator abort");
    };
    assert_eq!(fault.kind, CollaboratorKind::Sampler);
    assert_eq!(partial.tree.num_tries, 1);
    let child = partial.tree.failed_tries[0].child.as_ref().unwrap();
    // The faulty sample at depth 1 is not a try.
    assert_eq!(child.num_tries, 0);
    assert_eq!(partial.metrics.num_samples, 1);
}

// ---------------------------------------------------------------------------
// Consistency-failure policy
// ---------------------------------------------------------------------------

/// Stands still, then jumps two cells, then walks one cell at a time.
#[derive(Default)]
struct StillThenJump {
    calls: Mutex<usize>,
}

impl Sampler<Cell> for StillThenJump {
    fn sample(&self, _state: &Cell, _rng_seed: u64, _op: &GroundOperator) -> Result<Parameterization, CollaboratorFault> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        let delta = match *calls {
            1 => 0.0,
            2 => 2.0,
            _ => 1.0,
        };
        Ok(Parameterization::new(vec![delta]))
    }
}

#[test]
fn probe_policy_records_one_level_below_inconsistent_children() {
    init_logging();
    let (skeleton, atoms) = line_problem(3);
    let world = LineWorld::new(1);
    let sampler = StillThenJump::default();
    let states = [Cell(0)];
    let problem = SearchProblem {
        initial_states: &states,
        skeleton: &skeleton,
        atoms_sequence: &atoms,
        max_horizon: 100,
    };
    let probing = SearchConfig {
        max_samples_per_step: 5,
        on_consistency_failure: ConsistencyFailurePolicy::ProbeOneLevel,
        ..SearchConfig::default()
    };

    let outcome = search(
        &problem,
        line_collaborators(&world, &sampler, &AlwaysAccept),
        &probing,
        &StopPolicy::FirstSuccess,
        0,
        Deadline::Never,
    )
    .unwrap();
    assert!(outcome.success);

    // Root try 0 stands still; the probe below it jumps to Cell(2), which
    // matches depth 2 and is recorded without being expanded.
    let inconsistent = &outcome.tree.failed_tries[0];
    assert_eq!(inconsistent.reason, FailureReason::ExpectedAtomsMismatch);
    let probed = inconsistent.child.as_ref().unwrap();
    assert_eq!(probed.num_tries, 1);
    assert_eq!(probed.failed_tries[0].reason, FailureReason::Unexplored);
    let unexplored = probed.failed_tries[0].child.as_ref().unwrap();
    assert_eq!(unexplored.state, Cell(2));
    assert_eq!(unexplored.num_tries, 0);

    let mark_failed = SearchConfig {
        max_samples_per_step: 5,
        ..SearchConfig::default()
    };
    let sampler = StillThenJump::default();
    let outcome = search(
        &problem,
        line_collaborators(&world, &sampler, &AlwaysAccept),
        &mark_failed,
        &StopPolicy::FirstSuccess,
        0,
        Deadline::Never,
    )
    .unwrap();
    let inconsistent = outcome.tree.failed_tries[0].child.as_ref().unwrap();
    assert_eq!(inconsistent.num_tries, 0);
}
