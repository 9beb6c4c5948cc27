//! Symbolic and continuous data model.
//!
//! A [`Skeleton`] is an immutable sequence of [`GroundOperator`]s produced by
//! a task planner. Its [`AtomsSequence`] holds the expected symbolic state
//! before each step and after the last, so `atoms.len() == skeleton.len() + 1`
//! always holds for a constructed pair.

mod atom;
mod parameterization;
mod skeleton;
mod state;

pub use atom::{AtomSet, GroundAtom};
pub use parameterization::Parameterization;
pub use skeleton::{AtomsSequence, GroundOperator, Skeleton};
pub use state::{ObjectState, WorldState};

use thiserror::Error;

/// Structural violation of the data model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// `atoms_sequence` does not have exactly one more entry than the skeleton.
    #[error("atoms sequence has {atoms} entries but skeleton has {steps} steps (expected {})", steps + 1)]
    AtomsSequenceLength { steps: usize, atoms: usize },
    /// A state prefix was empty where at least the initial state is required.
    #[error("state prefix must contain at least one state")]
    EmptyStatePrefix,
    /// A state prefix is longer than the skeleton allows.
    #[error("state prefix of {states} states exceeds skeleton length {steps} + 1")]
    StatePrefixTooLong { states: usize, steps: usize },
    /// A demonstration's states or action counts do not align with its skeleton.
    #[error("demonstration of {steps} steps has {states} states and {action_counts} action counts")]
    DemonstrationMisaligned {
        steps: usize,
        states: usize,
        action_counts: usize,
    },
}
