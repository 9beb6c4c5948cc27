//! `Corridor`: a one-dimensional reference world with a fuel budget.
//!
//! A robot walks from cell `c0` towards cell `cN`, one `Move(robot, cK)` per
//! skeleton step. The sampler proposes a landing position near the target
//! cell; a step is consistent when the robot lands within `tolerance` of the
//! cell centre. Every move burns fuel equal to the distance travelled, and a
//! move the robot cannot pay for is not initiable. Wasteful early moves
//! therefore doom later steps, which is what the fuel-margin classifier
//! learns to detect.
//!
//! State: one object, `robot = [x, fuel]`.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sieve_kernel::model::{
    AtomSet, AtomsSequence, GroundAtom, GroundOperator, ModelError, ObjectState, Parameterization, Skeleton,
};
use sieve_search::classifier::{FeasibilityClassifier, FeasibilityQuery, InferenceWindow, Verdict};
use sieve_search::contract::{OptionModel, Sampler, SymbolicAbstraction, Transition};
use sieve_search::error::{CollaboratorFault, CollaboratorKind};
use tracing::debug;

use crate::collect::Simulator;
use crate::corpus::Demonstration;
use crate::dataset::FeasibilityDataset;
use crate::replica::{ClassifierTrainer, Device, TrainedClassifier};

pub const ROBOT: &str = "robot";

/// World parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corridor {
    /// Largest landing error that still counts as reaching a cell.
    pub tolerance: f64,
    /// Half-width of the sampler's landing distribution around a cell.
    pub spread: f64,
    /// Fuel granted per skeleton step at the start of a demonstration.
    pub fuel_per_step: f64,
    /// Primitive actions per unit of distance.
    pub actions_per_unit: f64,
}

impl Default for Corridor {
    fn default() -> Self {
        Self {
            tolerance: 0.4,
            spread: 0.5,
            fuel_per_step: 1.3,
            actions_per_unit: 4.0,
        }
    }
}

fn robot(state: &ObjectState, kind: CollaboratorKind) -> Result<(f64, f64), CollaboratorFault> {
    match state.get(ROBOT) {
        Some(&[x, fuel]) => Ok((x, fuel)),
        _ => Err(CollaboratorFault::new(kind, "state has no robot = [x, fuel]")),
    }
}

/// Target cell of `Move(robot, cK)` / `At(robot, cK)`.
fn cell_index(objects: &[String]) -> Option<f64> {
    objects
        .get(1)
        .and_then(|cell| cell.strip_prefix('c'))
        .and_then(|k| k.parse::<u32>().ok())
        .map(f64::from)
}

fn at(cell: usize) -> GroundAtom {
    GroundAtom::new("At", &[ROBOT, &format!("c{cell}")])
}

impl Corridor {
    #[must_use]
    pub fn skeleton(&self, len: usize) -> Skeleton {
        Skeleton::new(
            (1..=len)
                .map(|k| {
                    GroundOperator::new("Move", &[ROBOT, &format!("c{k}")])
                        .with_preconditions([at(k - 1)])
                        .with_add_effects([at(k)])
                        .with_delete_effects([at(k - 1)])
                })
                .collect(),
        )
    }

    #[must_use]
    pub fn atoms_sequence(&self, skeleton: &Skeleton) -> AtomsSequence {
        AtomsSequence::from_skeleton(AtomSet::from([at(0)]), skeleton)
    }

    #[must_use]
    pub fn initial_state(&self, len: usize) -> ObjectState {
        #[allow(clippy::cast_precision_loss)]
        let fuel = self.fuel_per_step * len as f64;
        ObjectState::new().with_object(ROBOT, vec![0.0, fuel])
    }

    /// A perfect walk of `len` unit moves.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the generated walk does not align with its
    /// skeleton.
    pub fn demonstration(&self, len: usize) -> Result<Demonstration<ObjectState>, ModelError> {
        let skeleton = self.skeleton(len);
        let atoms_sequence = self.atoms_sequence(&skeleton);
        let fuel = self.initial_state(len).feature(ROBOT, 1).unwrap_or_default();
        #[allow(clippy::cast_precision_loss)]
        let states = (0..=len)
            .map(|i| ObjectState::new().with_object(ROBOT, vec![i as f64, fuel - i as f64]))
            .collect();
        let step_action_counts = vec![self.actions_for(1.0); len];
        Demonstration::new(states, atoms_sequence, skeleton, step_action_counts)
    }

    #[must_use]
    pub fn simulator(&self) -> Simulator<'_, ObjectState> {
        Simulator {
            option_model: self,
            sampler: self,
            abstraction: self,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn actions_for(&self, distance: f64) -> usize {
        ((distance * self.actions_per_unit).ceil() as usize).max(1)
    }
}

impl OptionModel<ObjectState> for Corridor {
    fn initiable(
        &self,
        state: &ObjectState,
        _operator: &GroundOperator,
        parameterization: &Parameterization,
    ) -> Result<bool, CollaboratorFault> {
        let (x, fuel) = robot(state, CollaboratorKind::OptionModel)?;
        let target = parameterization.values().first().copied().unwrap_or(x);
        Ok((target - x).abs() <= fuel)
    }

    fn step(
        &self,
        state: &ObjectState,
        _operator: &GroundOperator,
        parameterization: &Parameterization,
    ) -> Result<Transition<ObjectState>, CollaboratorFault> {
        let (x, fuel) = robot(state, CollaboratorKind::OptionModel)?;
        let Some(&target) = parameterization.values().first() else {
            return Err(CollaboratorFault::new(
                CollaboratorKind::OptionModel,
                "Move expects one parameter",
            ));
        };
        let distance = (target - x).abs();
        let mut next_state = state.clone();
        next_state.set(ROBOT, vec![target, fuel - distance]);
        Ok(Transition {
            next_state,
            num_actions: self.actions_for(distance),
        })
    }
}

impl Sampler<ObjectState> for Corridor {
    fn sample(
        &self,
        _state: &ObjectState,
        rng_seed: u64,
        operator: &GroundOperator,
    ) -> Result<Parameterization, CollaboratorFault> {
        let cell = cell_index(&operator.objects).ok_or_else(|| {
            CollaboratorFault::new(CollaboratorKind::Sampler, format!("{operator} names no target cell"))
        })?;
        let mut rng = StdRng::seed_from_u64(rng_seed);
        let landing = cell + rng.random_range(-self.spread..=self.spread);
        Ok(Parameterization::new(vec![landing]))
    }
}

impl SymbolicAbstraction<ObjectState> for Corridor {
    fn holds(&self, atom: &GroundAtom, state: &ObjectState) -> bool {
        if atom.predicate != "At" || atom.objects.first().map(String::as_str) != Some(ROBOT) {
            return false;
        }
        match (cell_index(&atom.objects), state.feature(ROBOT, 0)) {
            (Some(k), Some(x)) => (x - k).abs() <= self.tolerance,
            _ => false,
        }
    }

    fn static_object_change(&self, before: &ObjectState, after: &ObjectState, operator: &GroundOperator) -> f64 {
        before.max_change_excluding(after, &operator.objects)
    }
}

/// Accepts a step when the fuel left after it covers `threshold` per
/// remaining step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FuelMargin {
    pub threshold: f64,
    pub min_prefix: usize,
}

impl FuelMargin {
    /// Margin of `fuel` over what `remaining` steps need; negative means short.
    #[must_use]
    pub fn margin(&self, fuel: f64, remaining: usize) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let need = self.threshold * remaining as f64;
        fuel - need
    }
}

impl FeasibilityClassifier<ObjectState> for FuelMargin {
    fn classify(&self, query: &FeasibilityQuery<'_, ObjectState>) -> Result<Verdict, CollaboratorFault> {
        let last = query
            .states
            .last()
            .ok_or_else(|| CollaboratorFault::new(CollaboratorKind::Classifier, "empty state prefix"))?;
        let (x, fuel) = robot(last, CollaboratorKind::Classifier)?;
        let spent = query
            .pending
            .and_then(|p| p.values().first())
            .map_or(0.0, |target| (target - x).abs());
        let remaining = query.skeleton.len().saturating_sub(query.prefix_length());
        let margin = self.margin(fuel - spent, remaining);
        let confidence = (margin.abs() / (1.0 + margin.abs())).max(0.5);
        Ok(if margin >= 0.0 {
            Verdict::accept(confidence)
        } else {
            Verdict::reject(confidence)
        })
    }

    fn inference_window(&self) -> InferenceWindow {
        InferenceWindow::from(self.min_prefix)
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "fuel_margin"
    }
}

impl TrainedClassifier<ObjectState> for FuelMargin {
    fn replicate(&self, _device: &Device) -> Arc<dyn FeasibilityClassifier<ObjectState>> {
        Arc::new(*self)
    }

    fn snapshot(&self) -> Result<Vec<u8>, CollaboratorFault> {
        serde_json::to_vec(self).map_err(|e| CollaboratorFault::new(CollaboratorKind::Classifier, e.to_string()))
    }
}

/// Fits [`FuelMargin`]: the threshold is the smallest fuel-per-remaining-step
/// ratio seen among positive prefixes.
#[derive(Debug, Default)]
pub struct FuelMarginTrainer {
    /// `min_inference_prefix` of every fit, in call order.
    pub fitted_prefixes: Vec<usize>,
}

/// Steps left after `states` and the fuel in the last state.
fn remaining_and_fuel(states: &[ObjectState], skeleton: &Skeleton) -> Option<(usize, f64)> {
    let remaining = skeleton.len().checked_sub(states.len().checked_sub(1)?)?;
    let fuel = states.last()?.feature(ROBOT, 1)?;
    Some((remaining, fuel))
}

impl ClassifierTrainer<ObjectState> for FuelMarginTrainer {
    #[allow(clippy::cast_precision_loss)]
    fn fit(
        &mut self,
        train: &FeasibilityDataset<ObjectState>,
        validation: &FeasibilityDataset<ObjectState>,
        min_inference_prefix: usize,
    ) -> Result<Box<dyn TrainedClassifier<ObjectState>>, CollaboratorFault> {
        self.fitted_prefixes.push(min_inference_prefix);
        let threshold = train
            .positives()
            .filter_map(|d| remaining_and_fuel(&d.states, &d.skeleton))
            .filter(|&(remaining, _)| remaining > 0)
            .map(|(remaining, fuel)| fuel / remaining as f64)
            .fold(f64::INFINITY, f64::min);
        let model = FuelMargin {
            threshold: if threshold.is_finite() { threshold } else { 0.0 },
            min_prefix: min_inference_prefix,
        };

        let labeled = validation
            .positives()
            .map(|d| (d, true))
            .chain(validation.negatives().map(|d| (d, false)));
        let (mut correct, mut total) = (0_usize, 0_usize);
        for (datapoint, expected) in labeled {
            if let Some((remaining, fuel)) = remaining_and_fuel(&datapoint.states, &datapoint.skeleton) {
                total += 1;
                correct += usize::from((model.margin(fuel, remaining) >= 0.0) == expected);
            }
        }
        debug!(
            threshold = model.threshold,
            min_inference_prefix,
            correct,
            total,
            "fuel margin fitted"
        );
        Ok(Box::new(model))
    }
}
