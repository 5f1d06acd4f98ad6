// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy shared by every graph operation.

use thiserror::Error;

use crate::store::StoreError;

/// A request field failed validation.
///
/// Raised before any store access; the call has no side effects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[VALIDATION] {field}: {reason}")]
pub struct ValidationError {
    /// Name of the offending field.
    pub field: &'static str,
    /// Human-readable description of the problem.
    pub reason: String,
}

impl ValidationError {
    /// Builds a validation error for `field`.
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the graph API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// Malformed or missing input.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The backing store failed or rejected a request.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The request was well-formed but cannot be executed as configured
    /// (empty traversal, invalid distance range shape, bad path bounds).
    #[error("[CONFIGURATION] {0}")]
    Configuration(String),
}

impl GraphError {
    /// Shorthand for a [`GraphError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns `true` for errors raised by the backing store.
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Result alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
