use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::atom::{AtomSet, GroundAtom};
use super::ModelError;
use crate::proof::hash::{ContentHash, DomainHasher};
use crate::proof::hash_domain::HashDomain;

/// An abstract action schema bound to concrete objects.
///
/// `name` identifies the schema (and therefore the sampler that
/// parameterizes it); `objects` are the bound arguments in schema order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroundOperator {
    pub name: String,
    pub objects: Vec<String>,
    #[serde(default)]
    pub preconditions: AtomSet,
    #[serde(default)]
    pub add_effects: AtomSet,
    #[serde(default)]
    pub delete_effects: AtomSet,
}

impl GroundOperator {
    /// A ground operator with no symbolic preconditions or effects.
    #[must_use]
    pub fn new(name: impl Into<String>, objects: &[&str]) -> Self {
        Self {
            name: name.into(),
            objects: objects.iter().map(|o| (*o).to_string()).collect(),
            preconditions: AtomSet::new(),
            add_effects: AtomSet::new(),
            delete_effects: AtomSet::new(),
        }
    }

    #[must_use]
    pub fn with_preconditions(mut self, atoms: impl IntoIterator<Item = GroundAtom>) -> Self {
        self.preconditions.extend(atoms);
        self
    }

    #[must_use]
    pub fn with_add_effects(mut self, atoms: impl IntoIterator<Item = GroundAtom>) -> Self {
        self.add_effects.extend(atoms);
        self
    }

    #[must_use]
    pub fn with_delete_effects(mut self, atoms: impl IntoIterator<Item = GroundAtom>) -> Self {
        self.delete_effects.extend(atoms);
        self
    }

    /// Whether the preconditions hold in `atoms`.
    #[must_use]
    pub fn is_applicable(&self, atoms: &AtomSet) -> bool {
        self.preconditions.is_subset(atoms)
    }

    /// Symbolic successor: `(atoms - delete_effects) | add_effects`.
    #[must_use]
    pub fn apply(&self, atoms: &AtomSet) -> AtomSet {
        let mut next: AtomSet = atoms.difference(&self.delete_effects).cloned().collect();
        next.extend(self.add_effects.iter().cloned());
        next
    }
}

impl fmt::Display for GroundOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.objects.join(", "))
    }
}

/// An ordered, immutable sequence of ground operators.
///
/// Cheap to clone: every datapoint labeled against a skeleton shares the
/// same backing slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Skeleton {
    steps: Arc<[GroundOperator]>,
}

impl Skeleton {
    #[must_use]
    pub fn new(steps: Vec<GroundOperator>) -> Self {
        Self {
            steps: steps.into(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn steps(&self) -> &[GroundOperator] {
        &self.steps
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&GroundOperator> {
        self.steps.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GroundOperator> {
        self.steps.iter()
    }

    /// Content hash over operator names and bound objects, in order.
    ///
    /// Symbolic preconditions/effects are not part of the identity: two
    /// skeletons grounding the same schemas on the same objects are the same
    /// skeleton for dataset purposes.
    #[must_use]
    pub fn digest(&self) -> ContentHash {
        let mut hasher = DomainHasher::new(HashDomain::Skeleton);
        self.feed(&mut hasher);
        hasher.finish()
    }

    /// Feed the skeleton identity into an in-progress hash.
    pub fn feed(&self, hasher: &mut DomainHasher) {
        hasher.part_u64(self.steps.len() as u64);
        for op in self.steps.iter() {
            hasher.part(op.name.as_bytes());
            hasher.part_u64(op.objects.len() as u64);
            for object in &op.objects {
                hasher.part(object.as_bytes());
            }
        }
    }

    /// Operator names, for logging.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|op| op.name.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a Skeleton {
    type Item = &'a GroundOperator;
    type IntoIter = std::slice::Iter<'a, GroundOperator>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

/// Expected symbolic state before each skeleton step and after the last.
///
/// Constructed only against a skeleton, so `len() == skeleton.len() + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AtomsSequence {
    atoms: Vec<AtomSet>,
}

impl AtomsSequence {
    /// Pair an explicit atoms sequence with its skeleton.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::AtomsSequenceLength`] unless
    /// `atoms.len() == skeleton.len() + 1`.
    pub fn new(skeleton: &Skeleton, atoms: Vec<AtomSet>) -> Result<Self, ModelError> {
        if atoms.len() != skeleton.len() + 1 {
            return Err(ModelError::AtomsSequenceLength {
                steps: skeleton.len(),
                atoms: atoms.len(),
            });
        }
        Ok(Self { atoms })
    }

    /// Derive the sequence by symbolically applying each operator in turn.
    #[must_use]
    pub fn from_skeleton(init: AtomSet, skeleton: &Skeleton) -> Self {
        let mut atoms = Vec::with_capacity(skeleton.len() + 1);
        atoms.push(init);
        for op in skeleton {
            let next = op.apply(&atoms[atoms.len() - 1]);
            atoms.push(next);
        }
        Self { atoms }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Always false for a constructed sequence; present for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&AtomSet> {
        self.atoms.get(index)
    }

    /// The atoms expected after the final step.
    #[must_use]
    pub fn goal(&self) -> Option<&AtomSet> {
        self.atoms.last()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[AtomSet] {
        &self.atoms
    }

    /// Check the length invariant against a skeleton received separately.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::AtomsSequenceLength`] on mismatch.
    pub fn check_against(&self, skeleton: &Skeleton) -> Result<(), ModelError> {
        if self.atoms.len() == skeleton.len() + 1 {
            Ok(())
        } else {
            Err(ModelError::AtomsSequenceLength {
                steps: skeleton.len(),
                atoms: self.atoms.len(),
            })
        }
    }
}
