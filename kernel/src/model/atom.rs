use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A predicate applied to concrete objects, e.g. `On(block0, table)`.
///
/// Ordered by `(predicate, objects)` so atom sets iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroundAtom {
    pub predicate: String,
    pub objects: Vec<String>,
}

impl GroundAtom {
    #[must_use]
    pub fn new(predicate: impl Into<String>, objects: &[&str]) -> Self {
        Self {
            predicate: predicate.into(),
            objects: objects.iter().map(|o| (*o).to_string()).collect(),
        }
    }
}

impl fmt::Display for GroundAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.predicate, self.objects.join(", "))
    }
}

/// One symbolic-state snapshot.
pub type AtomSet = BTreeSet<GroundAtom>;
