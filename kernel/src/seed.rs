//! Deterministic sub-seed derivation.
//!
//! Every sample drawn during refinement gets its own seed, derived from the
//! search seed, the node depth and the path of try indices that led to the
//! node. Two nodes at the same depth in different subtrees therefore draw
//! different samples, and replaying a search with the same seed reproduces
//! every sample exactly.

use crate::proof::hash::DomainHasher;
use crate::proof::hash_domain::HashDomain;

/// Derive the seed for try `try_index` at a node reached by `try_path`.
///
/// `try_path[i]` is the try index taken at depth `root_depth + i` on the way
/// down; `depth` is the absolute skeleton index of the node being sampled.
#[must_use]
pub fn derive_sample_seed(seed: u64, depth: usize, try_path: &[usize], try_index: usize) -> u64 {
    let mut hasher = DomainHasher::new(HashDomain::SampleSeed);
    hasher.part_u64(seed);
    hasher.part_u64(depth as u64);
    hasher.part_u64(try_path.len() as u64);
    for &step in try_path {
        hasher.part_u64(step as u64);
    }
    hasher.part_u64(try_index as u64);
    let digest = hasher.finish_bytes();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}
