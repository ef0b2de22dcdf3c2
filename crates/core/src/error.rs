// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use affilink_domain::DomainError;
use thiserror::Error;

/// Errors raised by a ledger store implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    /// A concurrent writer won; the transaction may be retried.
    #[error("write conflict: {0}")]
    Conflict(String),
    /// A uniqueness constraint rejected the write.
    #[error("duplicate {entity}: {key}")]
    Duplicate { entity: &'static str, key: String },
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The transaction body aborted with an invariant violation.
    #[error("transaction rejected: {0}")]
    Rejected(String),
}

/// Errors returned by engine operations.
///
/// Business non-creation (duplicate source, failed rule condition, zero
/// amount) is reported through result enums, never through this type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    #[error("domain rule violated: {0}")]
    Domain(#[from] DomainError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// An error type a transaction body may return.
///
/// The retry loop needs to tell write conflicts apart from everything else.
pub trait TxFailure: From<StoreError> {
    fn is_conflict(&self) -> bool;
}

impl TxFailure for StoreError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl TxFailure for CoreError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict(_)))
    }
}
