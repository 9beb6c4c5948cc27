//! Shared fixtures for the lock tests: a scripted integer line world and
//! collaborators with fully predictable behavior.
//!
//! The line world moves a position by the sampled amount. Step `i` of an
//! `n`-step skeleton expects the atom `At(i+1)`, which holds only when the
//! position is exactly `i+1`, so a sample of `1.0` is consistent and
//! anything else is not.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use sieve_kernel::model::{AtomSet, AtomsSequence, GroundAtom, GroundOperator, Parameterization, Skeleton, WorldState};
use sieve_search::classifier::{FeasibilityClassifier, FeasibilityQuery, InferenceWindow, Verdict};
use sieve_search::contract::{Collaborators, OptionModel, Sampler, SymbolicAbstraction, Transition};
use sieve_search::error::{CollaboratorFault, CollaboratorKind};
use sieve_search::tree::BacktrackingTree;

/// Install a test-writer subscriber once per process. Safe to call from
/// every test.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

/// Integer position on the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell(pub i64);

impl WorldState for Cell {
    fn identity_bytes(&self) -> Vec<u8> {
        self.0.to_le_bytes().to_vec()
    }
}

/// An `n`-step line skeleton and its atoms sequence `At(0) .. At(n)`.
///
/// # Panics
///
/// Never: the atoms sequence is built with `n + 1` entries.
#[must_use]
pub fn line_problem(n: usize) -> (Skeleton, AtomsSequence) {
    let skeleton = Skeleton::new((0..n).map(|_| GroundOperator::new("Step", &[])).collect());
    let atoms = (0..=n)
        .map(|i| AtomSet::from([GroundAtom::new("At", &[&i.to_string()])]))
        .collect();
    let atoms = AtomsSequence::new(&skeleton, atoms).unwrap();
    (skeleton, atoms)
}

/// Option model and abstraction of the line world. Counts simulations.
#[derive(Debug, Default)]
pub struct LineWorld {
    steps: AtomicUsize,
    /// Primitive actions charged per step.
    pub actions_per_step: usize,
}

impl LineWorld {
    #[must_use]
    pub fn new(actions_per_step: usize) -> Self {
        Self {
            steps: AtomicUsize::new(0),
            actions_per_step,
        }
    }

    #[must_use]
    pub fn num_steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }
}

impl OptionModel<Cell> for LineWorld {
    fn step(
        &self,
        state: &Cell,
        _operator: &GroundOperator,
        parameterization: &Parameterization,
    ) -> Result<Transition<Cell>, CollaboratorFault> {
        self.steps.fetch_add(1, Ordering::SeqCst);
        #[allow(clippy::cast_possible_truncation)]
        let delta = parameterization.values()[0] as i64;
        Ok(Transition {
            next_state: Cell(state.0 + delta),
            num_actions: self.actions_per_step,
        })
    }
}

impl SymbolicAbstraction<Cell> for LineWorld {
    fn holds(&self, atom: &GroundAtom, state: &Cell) -> bool {
        atom.objects[0] == state.0.to_string()
    }
}

/// Proposes `0.0` on the first call from each position and `1.0` after,
/// so every node succeeds on its second try.
#[derive(Debug, Default)]
pub struct SecondTrySampler {
    calls: Mutex<BTreeMap<i64, usize>>,
}

impl Sampler<Cell> for SecondTrySampler {
    fn sample(&self, state: &Cell, _rng_seed: u64, _operator: &GroundOperator) -> Result<Parameterization, CollaboratorFault> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| CollaboratorFault::new(CollaboratorKind::Sampler, "poisoned"))?;
        let seen = calls.entry(state.0).or_insert(0);
        *seen += 1;
        Ok(Parameterization::new(vec![if *seen >= 2 { 1.0 } else { 0.0 }]))
    }
}

/// Draws `0`, `1` or `2` from the seed alone; consistent one time in three.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeededSampler;

impl Sampler<Cell> for SeededSampler {
    fn sample(&self, _state: &Cell, rng_seed: u64, _operator: &GroundOperator) -> Result<Parameterization, CollaboratorFault> {
        #[allow(clippy::cast_precision_loss)]
        let delta = (rng_seed % 3) as f64;
        Ok(Parameterization::new(vec![delta]))
    }
}

/// Always proposes the consistent move, sleeping first when sampling from
/// position `slow_at`.
#[derive(Debug, Clone, Copy)]
pub struct SlowSampler {
    pub slow_at: i64,
    pub delay: Duration,
}

impl Sampler<Cell> for SlowSampler {
    fn sample(&self, state: &Cell, _rng_seed: u64, _operator: &GroundOperator) -> Result<Parameterization, CollaboratorFault> {
        if state.0 == self.slow_at {
            std::thread::sleep(self.delay);
        }
        Ok(Parameterization::new(vec![1.0]))
    }
}

/// Rejects every query inside its window.
#[derive(Debug, Clone, Copy)]
pub struct RejectInWindow(pub InferenceWindow);

impl FeasibilityClassifier<Cell> for RejectInWindow {
    fn classify(&self, _query: &FeasibilityQuery<'_, Cell>) -> Result<Verdict, CollaboratorFault> {
        Ok(Verdict::reject(1.0))
    }

    fn inference_window(&self) -> InferenceWindow {
        self.0
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "reject_in_window"
    }
}

/// Rejects pending moves of exactly `0.0` inside its window.
#[derive(Debug, Clone, Copy)]
pub struct RejectStandStill(pub InferenceWindow);

impl FeasibilityClassifier<Cell> for RejectStandStill {
    fn classify(&self, query: &FeasibilityQuery<'_, Cell>) -> Result<Verdict, CollaboratorFault> {
        let stand_still = query
            .pending
            .is_some_and(|p| p.values().first().is_some_and(|v| *v == 0.0));
        Ok(if stand_still {
            Verdict::reject(0.8)
        } else {
            Verdict::accept(0.8)
        })
    }

    fn inference_window(&self) -> InferenceWindow {
        self.0
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "reject_stand_still"
    }
}

/// Line-world collaborators with the given sampler and classifier.
#[must_use]
pub fn line_collaborators<'a>(
    world: &'a LineWorld,
    sampler: &'a dyn Sampler<Cell>,
    classifier: &'a dyn FeasibilityClassifier<Cell>,
) -> Collaborators<'a, Cell> {
    Collaborators {
        option_model: world,
        sampler,
        abstraction: world,
        classifier,
    }
}

/// Structural fingerprint of a tree: every node's depth, state, try count
/// and outcome in preorder, plus each try's parameterization and reason.
#[must_use]
pub fn tree_signature(tree: &BacktrackingTree<Cell>) -> Vec<String> {
    let mut out = Vec::new();
    signature_into(tree, &mut out);
    out
}

fn signature_into(node: &BacktrackingTree<Cell>, out: &mut Vec<String>) {
    out.push(format!(
        "node d={} s={} tries={} ok={}",
        node.depth, node.state.0, node.num_tries, node.is_successful
    ));
    for t in &node.successful_tries {
        out.push(format!("success #{} {:?}", t.try_index, t.parameterization.values()));
        signature_into(&t.child, out);
    }
    for t in &node.failed_tries {
        out.push(format!(
            "failure #{} {:?} {}",
            t.try_index,
            t.parameterization.values(),
            t.reason.as_str()
        ));
        if let Some(child) = &t.child {
            signature_into(child, out);
        }
    }
}
