use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::proof::hash::{canonical_hash, ContentHash};
use crate::proof::hash_domain::HashDomain;

/// Contract for continuous world states.
///
/// The search core never looks inside a state. It only clones states into
/// trajectories and hashes them for dataset deduplication.
pub trait WorldState: Clone + Debug + Send + Sync + 'static {
    /// Bytes that identify this state. Equal states must produce equal bytes.
    fn identity_bytes(&self) -> Vec<u8>;

    /// Content hash of [`WorldState::identity_bytes`].
    fn fingerprint(&self) -> ContentHash {
        canonical_hash(HashDomain::WorldState, &self.identity_bytes())
    }
}

/// Object-centric state: each named object carries a feature vector.
///
/// Objects iterate in name order, which makes [`WorldState::identity_bytes`]
/// independent of insertion order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectState {
    objects: BTreeMap<String, Vec<f64>>,
}

impl ObjectState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_object(mut self, name: impl Into<String>, features: Vec<f64>) -> Self {
        self.objects.insert(name.into(), features);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, features: Vec<f64>) {
        self.objects.insert(name.into(), features);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.objects.get(name).map(Vec::as_slice)
    }

    /// Feature `index` of object `name`, if both exist.
    #[must_use]
    pub fn feature(&self, name: &str, index: usize) -> Option<f64> {
        self.objects.get(name).and_then(|f| f.get(index)).copied()
    }

    pub fn objects(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.objects.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Largest absolute feature change between `self` and `other` over every
    /// object not named in `excluded`.
    ///
    /// Objects present in only one of the two states count as infinitely
    /// changed, as do feature vectors of different length.
    #[must_use]
    pub fn max_change_excluding(&self, other: &Self, excluded: &[String]) -> f64 {
        let mut worst = 0.0_f64;
        let names = self.objects.keys().chain(other.objects.keys());
        for name in names {
            if excluded.iter().any(|e| e == name) {
                continue;
            }
            match (self.objects.get(name), other.objects.get(name)) {
                (Some(a), Some(b)) if a.len() == b.len() => {
                    for (x, y) in a.iter().zip(b) {
                        worst = worst.max((x - y).abs());
                    }
                }
                _ => return f64::INFINITY,
            }
        }
        worst
    }
}

impl WorldState for ObjectState {
    fn identity_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.objects.len() as u64).to_le_bytes());
        for (name, features) in &self.objects {
            out.extend_from_slice(&(name.len() as u64).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&(features.len() as u64).to_le_bytes());
            for value in features {
                out.extend_from_slice(&value.to_bits().to_le_bytes());
            }
        }
        out
    }
}
