//! Proof module: domain-separated content hashing.
//!
//! Depends on nothing internal. Every digest in the workspace is computed here.

pub mod hash;
pub mod hash_domain;
