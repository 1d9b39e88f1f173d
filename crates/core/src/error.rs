//! Domain error model.

use thiserror::Error;

/// Result type used across the ledger.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every failure in the ledger is local and synchronous: the caller gets the
/// error back before any stock, log or record mutation has been performed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (non-positive payment, over-payment, empty return set, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced sale, layaway, order or product does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The environment cannot resolve something the operation needs (e.g. a target branch).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Stock would go negative under the strict oversell policy.
    #[error(
        "insufficient stock for product {product} at branch {branch}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        product: String,
        branch: String,
        available: i64,
        requested: i64,
    },

    /// A conflict occurred (e.g. a transition that lost a race).
    #[error("conflict: {0}")]
    Conflict(String),

    /// No acting user is available for an operation that must be attributed.
    #[error("unauthorized")]
    Unauthorized,

    /// The persistence collaborator failed (poisoned lock, unavailable backend).
    #[error("storage failure: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for errors caused by caller input rather than environment or storage.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InvalidId(_)
                | Self::NotFound { .. }
                | Self::InsufficientStock { .. }
        )
    }
}
