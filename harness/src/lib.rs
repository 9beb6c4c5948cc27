//! Sieve Harness: curriculum data generation around the search engine.
//!
//! The harness drives the engine over a demonstration corpus, folds the
//! resulting trees into feasibility datasets and retrains the classifier
//! between stages. It does NOT implement search; it delegates to
//! `sieve-search`. Worlds provide collaborators only; the harness owns
//! orchestration.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collect;
pub mod config;
pub mod corpus;
pub mod dataset;
pub mod replica;
pub mod snapshot;
pub mod worlds;
