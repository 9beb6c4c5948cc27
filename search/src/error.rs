//! Typed search errors.
//!
//! An exhausted search is not an error: it returns a tree with
//! `success == false`. Errors here split into pre-flight failures
//! ([`InvalidSearch`], no tree is built) and aborts ([`SearchError`]), which
//! always carry the partially built tree so progress is never lost.

use std::fmt;

use serde::{Deserialize, Serialize};
use sieve_kernel::model::ModelError;
use thiserror::Error;

use crate::metrics::SearchMetrics;
use crate::tree::BacktrackingTree;

/// Which external collaborator raised a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollaboratorKind {
    OptionModel,
    Sampler,
    Classifier,
    Abstraction,
    TaskPlanner,
}

impl fmt::Display for CollaboratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OptionModel => "option model",
            Self::Sampler => "sampler",
            Self::Classifier => "classifier",
            Self::Abstraction => "symbolic abstraction",
            Self::TaskPlanner => "task planner",
        };
        f.write_str(name)
    }
}

/// A fault reported by an external collaborator.
///
/// The engine does not retry: the fault aborts the current search.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} fault: {detail}")]
pub struct CollaboratorFault {
    pub kind: CollaboratorKind,
    pub detail: String,
}

impl CollaboratorFault {
    #[must_use]
    pub fn new(kind: CollaboratorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Pre-flight failure: the search was never started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSearch {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("invalid search config: {detail}")]
    Config { detail: String },
}

/// Everything built before an abort.
#[derive(Debug, Clone)]
pub struct PartialSearch<S> {
    pub tree: BacktrackingTree<S>,
    pub metrics: SearchMetrics,
}

/// Typed failure of one search invocation.
#[derive(Debug, Error)]
pub enum SearchError<S: fmt::Debug> {
    #[error(transparent)]
    Invalid(#[from] InvalidSearch),
    /// The wall-clock deadline elapsed mid-search.
    #[error("search deadline exceeded after {} samples", .0.metrics.num_samples)]
    DeadlineExceeded(Box<PartialSearch<S>>),
    /// An external collaborator faulted mid-search.
    #[error("search aborted: {fault}")]
    Collaborator {
        #[source]
        fault: CollaboratorFault,
        partial: Box<PartialSearch<S>>,
    },
}

impl<S: fmt::Debug> SearchError<S> {
    /// The partial search, unless the search never started.
    #[must_use]
    pub fn partial(&self) -> Option<&PartialSearch<S>> {
        match self {
            Self::Invalid(_) => None,
            Self::DeadlineExceeded(partial) | Self::Collaborator { partial, .. } => Some(partial),
        }
    }

    /// Take ownership of the partial search.
    #[must_use]
    pub fn into_partial(self) -> Option<PartialSearch<S>> {
        match self {
            Self::Invalid(_) => None,
            Self::DeadlineExceeded(partial) | Self::Collaborator { partial, .. } => Some(*partial),
        }
    }

    #[must_use]
    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::DeadlineExceeded(_))
    }
}
