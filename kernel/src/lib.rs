//! Sieve Kernel: the symbolic data model shared by the refinement search
//! and the data-collection harness.
//!
//! # API Surface
//!
//! - [`model`] -- ground atoms, ground operators, skeletons, atoms sequences,
//!   parameterizations and the [`model::WorldState`] contract
//! - [`proof::hash`] -- domain-separated SHA-256 content hashing
//! - [`seed`] -- deterministic sub-seed derivation for per-node sampling
//!
//! # Module Dependency Direction
//!
//! `proof` ← `model`, `proof` ← `seed`
//!
//! One-way only. `proof` depends on nothing internal; `model` and `seed`
//! never import each other.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod model;
pub mod proof;
pub mod seed;
