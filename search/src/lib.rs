//! Sieve Search: backtracking refinement of a symbolic skeleton into a
//! continuous low-level plan, with classifier-based pruning.
//!
//! This crate depends only on `sieve_kernel` — it does NOT depend on
//! `sieve_harness`.
//!
//! # Crate dependency graph
//!
//! ```text
//! sieve_kernel  ←  sieve_search  ←  sieve_harness
//! (data model)     (tree, engine)    (dataset, curriculum, workers)
//! ```
//!
//! # Key types
//!
//! - [`BacktrackingTree`](tree::BacktrackingTree) — owned record of one search attempt
//! - [`search`](search::search) — the low-level search engine
//! - [`SearchConfig`](policy::SearchConfig) — sample budget and consistency checks
//! - [`StopCondition`](policy::StopCondition) — injected per-node stop predicate
//! - [`FeasibilityClassifier`](classifier::FeasibilityClassifier) — pruning capability
//! - [`OptionModel`](contract::OptionModel), [`Sampler`](contract::Sampler),
//!   [`SymbolicAbstraction`](contract::SymbolicAbstraction) — external collaborators
//! - [`refine_skeletons`](planning::refine_skeletons) — planning loop over a
//!   task planner's skeleton stream

#![forbid(unsafe_code)]

pub mod classifier;
pub mod contract;
pub mod error;
pub mod metrics;
pub mod planning;
pub mod policy;
pub mod search;
pub mod tree;
