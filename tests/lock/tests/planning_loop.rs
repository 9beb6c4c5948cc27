//! Planning-loop lock tests over a task planner's skeleton stream.
//!
//! Proves:
//! 1. The first skeleton that refines wins; earlier failures are reported as partials
//! 2. The loop stops after `max_skeletons_optimized` candidates
//! 3. A deadline yields a timeout carrying the partial refinements
//! 4. Planner failures and planner timeouts surface with the partials
//!    gathered so far and the planner's own report

use std::collections::BTreeMap;
use std::time::Duration;

use lock_tests::{init_logging, line_collaborators, line_problem, Cell, LineWorld, SlowSampler};
use sieve_kernel::model::{AtomSet, AtomsSequence, GroundAtom, GroundOperator, Skeleton};
use sieve_search::classifier::AlwaysAccept;
use sieve_search::planning::{refine_skeletons, CandidateSkeleton, PlannerError, PlanningConfig, PlanningError};
use sieve_search::policy::{Deadline, SearchConfig};

/// A skeleton whose last step expects an unreachable cell.
fn dead_end(n: usize) -> CandidateSkeleton {
    let skeleton = Skeleton::new((0..n).map(|_| GroundOperator::new("Step", &[])).collect());
    let atoms = (0..=n)
        .map(|i| {
            let cell = if i == n { -1 } else { i64::try_from(i).unwrap() };
            AtomSet::from([GroundAtom::new("At", &[&cell.to_string()])])
        })
        .collect();
    CandidateSkeleton {
        atoms_sequence: AtomsSequence::new(&skeleton, atoms).unwrap(),
        skeleton,
        planner_metrics: BTreeMap::from([("num_nodes_expanded".to_string(), 7)]),
    }
}

fn reachable(n: usize) -> CandidateSkeleton {
    let (skeleton, atoms_sequence) = line_problem(n);
    CandidateSkeleton {
        skeleton,
        atoms_sequence,
        planner_metrics: BTreeMap::from([("num_nodes_expanded".to_string(), 11)]),
    }
}

fn config(max_skeletons_optimized: usize) -> PlanningConfig {
    PlanningConfig {
        search: SearchConfig {
            max_samples_per_step: 2,
            ..SearchConfig::default()
        },
        max_skeletons_optimized,
        max_horizon: 100,
    }
}

fn always_consistent() -> SlowSampler {
    SlowSampler {
        slow_at: i64::MIN,
        delay: Duration::ZERO,
    }
}

#[test]
fn first_refinable_skeleton_wins() {
    init_logging();
    let world = LineWorld::new(1);
    let sampler = always_consistent();
    let planner = vec![Ok::<_, PlannerError>(dead_end(2)), Ok(reachable(3)), Ok(reachable(1))];

    let plan = refine_skeletons(
        &Cell(0),
        planner,
        line_collaborators(&world, &sampler, &AlwaysAccept),
        &config(8),
        0,
        Deadline::Never,
    )
    .unwrap();

    assert_eq!(plan.skeleton.len(), 3);
    assert_eq!(plan.trajectory.states, [Cell(0), Cell(1), Cell(2), Cell(3)]);
    assert_eq!(plan.metrics.num_skeletons_optimized, 2);
    assert_eq!(plan.metrics.planner.get("num_nodes_expanded"), Some(&11));
}

#[test]
fn exhaustion_reports_one_partial_per_skeleton() {
    init_logging();
    let world = LineWorld::new(1);
    let sampler = always_consistent();
    let planner = (0..10).map(|_| Ok::<_, PlannerError>(dead_end(2)));

    let err = refine_skeletons(
        &Cell(0),
        planner,
        line_collaborators(&world, &sampler, &AlwaysAccept),
        &config(3),
        0,
        Deadline::Never,
    )
    .unwrap_err();

    let PlanningError::AllSkeletonsExhausted {
        partial_refinements,
        metrics,
    } = err
    else {
        panic!("expected exhaustion");
    };
    assert_eq!(metrics.num_skeletons_optimized, 3);
    assert_eq!(partial_refinements.len(), 3);
    for partial in &partial_refinements {
        // Deepest path: both steps simulated, the last one inconsistent.
        assert_eq!(partial.trajectory.states.len(), 3);
    }
}

#[test]
fn deadline_yields_timeout_with_partials() {
    init_logging();
    let world = LineWorld::new(1);
    let sampler = SlowSampler {
        slow_at: 1,
        delay: Duration::from_millis(150),
    };
    let planner = vec![Ok::<_, PlannerError>(dead_end(1)), Ok(reachable(3)), Ok(reachable(3))];

    let err = refine_skeletons(
        &Cell(0),
        planner,
        line_collaborators(&world, &sampler, &AlwaysAccept),
        &config(8),
        0,
        Deadline::after(Duration::from_millis(60)),
    )
    .unwrap_err();

    assert!(
        matches!(err, PlanningError::Timeout { planner_detail: None, .. }),
        "got {err}"
    );
    let partials = err.partial_refinements();
    assert_eq!(partials.len(), 2);
    assert_eq!(partials[0].skeleton.len(), 1);
    assert!(partials[1].trajectory.states.len() >= 2);
}

#[test]
fn planner_failure_keeps_partials() {
    init_logging();
    let world = LineWorld::new(1);
    let sampler = always_consistent();
    let planner = vec![
        Ok(dead_end(2)),
        Err(PlannerError::Failed {
            detail: "goal unreachable".into(),
        }),
    ];

    let err = refine_skeletons(
        &Cell(0),
        planner,
        line_collaborators(&world, &sampler, &AlwaysAccept),
        &config(8),
        0,
        Deadline::Never,
    )
    .unwrap_err();

    assert!(matches!(err, PlanningError::Planner { .. }));
    assert_eq!(err.partial_refinements().len(), 1);
    assert!(err.to_string().contains("goal unreachable"));
}

#[test]
fn planner_timeout_is_a_planning_timeout() {
    let world = LineWorld::new(1);
    let sampler = always_consistent();
    let planner = vec![
        Ok(dead_end(1)),
        Err(PlannerError::Timeout {
            detail: "search budget".into(),
        }),
    ];

    let err = refine_skeletons(
        &Cell(0),
        planner,
        line_collaborators(&world, &sampler, &AlwaysAccept),
        &config(8),
        0,
        Deadline::Never,
    )
    .unwrap_err();
    let PlanningError::Timeout {
        ref partial_refinements,
        ref planner_detail,
        ..
    } = err
    else {
        panic!("expected a planning timeout");
    };
    assert_eq!(planner_detail.as_deref(), Some("search budget"));
    assert_eq!(partial_refinements.len(), 1);
}
