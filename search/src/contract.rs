//! External collaborator contracts.
//!
//! The search engine treats every collaborator as a synchronous black box.
//!
//! # Contract
//!
//! - [`OptionModel::step`] must be deterministic in `(state, operator,
//!   parameterization)`. Hidden randomness breaks search reproducibility.
//! - [`Sampler::sample`] must draw all of its randomness from `rng_seed`.
//! - Collaborators report faults through [`CollaboratorFault`]; the engine
//!   never retries around a fault, it aborts the search and surfaces the
//!   partial tree.

use std::collections::BTreeMap;

use sieve_kernel::model::{GroundAtom, GroundOperator, Parameterization, WorldState};

use crate::classifier::FeasibilityClassifier;
use crate::error::{CollaboratorFault, CollaboratorKind};

/// Result of simulating one parameterized step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<S> {
    pub next_state: S,
    /// Primitive low-level actions consumed by the step (counts against the horizon).
    pub num_actions: usize,
}

/// Executes one continuous action and returns the resulting state.
pub trait OptionModel<S: WorldState>: Send + Sync {
    /// Whether `parameterization` can be started from `state`.
    ///
    /// A non-initiable sample is rejected without simulation.
    fn initiable(
        &self,
        _state: &S,
        _operator: &GroundOperator,
        _parameterization: &Parameterization,
    ) -> Result<bool, CollaboratorFault> {
        Ok(true)
    }

    /// Simulate `parameterization` from `state`.
    fn step(
        &self,
        state: &S,
        operator: &GroundOperator,
        parameterization: &Parameterization,
    ) -> Result<Transition<S>, CollaboratorFault>;
}

/// Proposes continuous parameterizations for a ground operator.
pub trait Sampler<S: WorldState>: Send + Sync {
    fn sample(
        &self,
        state: &S,
        rng_seed: u64,
        operator: &GroundOperator,
    ) -> Result<Parameterization, CollaboratorFault>;
}

/// Evaluates symbolic atoms on continuous states.
pub trait SymbolicAbstraction<S: WorldState>: Send + Sync {
    /// Whether `atom` holds in `state`.
    fn holds(&self, atom: &GroundAtom, state: &S) -> bool;

    /// Largest state change between `before` and `after` among objects the
    /// operator does not touch. Compared against the configured tolerance
    /// when static-object checking is enabled.
    fn static_object_change(&self, _before: &S, _after: &S, _operator: &GroundOperator) -> f64 {
        0.0
    }
}

/// One sampler per abstract operator, dispatched on the operator's schema name.
pub struct SamplerRegistry<S: WorldState> {
    samplers: BTreeMap<String, Box<dyn Sampler<S>>>,
}

impl<S: WorldState> SamplerRegistry<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            samplers: BTreeMap::new(),
        }
    }

    /// Register the sampler for schema `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, sampler: Box<dyn Sampler<S>>) {
        self.samplers.insert(name.into(), sampler);
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, sampler: Box<dyn Sampler<S>>) -> Self {
        self.register(name, sampler);
        self
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.samplers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.samplers.keys().map(String::as_str)
    }
}

impl<S: WorldState> Default for SamplerRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: WorldState> Sampler<S> for SamplerRegistry<S> {
    fn sample(
        &self,
        state: &S,
        rng_seed: u64,
        operator: &GroundOperator,
    ) -> Result<Parameterization, CollaboratorFault> {
        let sampler = self.samplers.get(&operator.name).ok_or_else(|| {
            CollaboratorFault::new(
                CollaboratorKind::Sampler,
                format!("no sampler registered for operator {}", operator.name),
            )
        })?;
        sampler.sample(state, rng_seed, operator)
    }
}

/// The collaborators one search invocation consults.
///
/// Borrowed, never owned: a worker builds one per search from shared
/// references plus its own classifier replica.
pub struct Collaborators<'a, S: WorldState> {
    pub option_model: &'a dyn OptionModel<S>,
    pub sampler: &'a dyn Sampler<S>,
    pub abstraction: &'a dyn SymbolicAbstraction<S>,
    pub classifier: &'a dyn FeasibilityClassifier<S>,
}

impl<S: WorldState> Clone for Collaborators<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: WorldState> Copy for Collaborators<'_, S> {}

impl<'a, S: WorldState> Collaborators<'a, S> {
    /// Same collaborators, different classifier.
    #[must_use]
    pub fn with_classifier(self, classifier: &'a dyn FeasibilityClassifier<S>) -> Self {
        Self { classifier, ..self }
    }
}
