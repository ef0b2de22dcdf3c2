// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Error types for the API layer.

use affilink::{CoreError, StoreError};
use affilink_domain::DomainError;
use tracing::error;

/// Authentication and authorization errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Authentication failed.
    AuthenticationFailed {
        /// The reason authentication failed.
        reason: String,
    },
    /// The actor's role does not allow the action.
    Unauthorized {
        /// The action that was attempted.
        action: String,
        /// The role required for this action.
        required_role: String,
    },
    /// The actor targeted a profile it does not own.
    NotOwner {
        /// The action that was attempted.
        action: String,
    },
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthenticationFailed { reason } => {
                write!(f, "Authentication failed: {reason}")
            }
            Self::Unauthorized {
                action,
                required_role,
            } => {
                write!(f, "Unauthorized: '{action}' requires {required_role} role")
            }
            Self::NotOwner { action } => {
                write!(f, "Unauthorized: '{action}' is limited to your own account")
            }
        }
    }
}

impl std::error::Error for AuthError {}

/// API-level errors.
///
/// These are distinct from domain/core errors and represent the API contract.
/// Messages are safe to show to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Authentication failed.
    AuthenticationFailed {
        /// The reason authentication failed.
        reason: String,
    },
    /// Authorization failed - the actor does not have permission.
    Unauthorized {
        /// The action that was attempted.
        action: String,
        /// The role required for this action.
        required_role: String,
    },
    /// The caller may not perform this action on this account.
    PermissionDenied {
        /// A human-readable description.
        message: String,
    },
    /// A domain rule or lifecycle precondition was violated.
    DomainRuleViolation {
        /// The rule that was violated.
        rule: String,
        /// A human-readable description of the violation.
        message: String,
    },
    /// Invalid input was provided.
    InvalidInput {
        /// The field that was invalid.
        field: String,
        /// A human-readable description of the error.
        message: String,
    },
    /// A requested resource was not found.
    ResourceNotFound {
        /// The type of resource that was not found.
        resource_type: String,
        /// A human-readable description of what was not found.
        message: String,
    },
    /// An internal error occurred. Details are logged, never returned.
    Internal {
        /// A generic description of the failure.
        message: String,
    },
}

impl ApiError {
    /// The callable-function error code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed { .. } => "unauthenticated",
            Self::Unauthorized { .. } | Self::PermissionDenied { .. } => "permission-denied",
            Self::DomainRuleViolation { .. } => "failed-precondition",
            Self::InvalidInput { .. } => "invalid-argument",
            Self::ResourceNotFound { .. } => "not-found",
            Self::Internal { .. } => "internal",
        }
    }

    pub(crate) fn invalid(field: &str, message: &str) -> Self {
        Self::InvalidInput {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    fn internal() -> Self {
        Self::Internal {
            message: String::from("The operation could not be completed. Please try again later."),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthenticationFailed { reason } => {
                write!(f, "Authentication failed: {reason}")
            }
            Self::Unauthorized {
                action,
                required_role,
            } => {
                write!(f, "Unauthorized: '{action}' requires {required_role} role")
            }
            Self::PermissionDenied { message } => write!(f, "Permission denied: {message}"),
            Self::DomainRuleViolation { rule, message } => {
                write!(f, "Domain rule violation ({rule}): {message}")
            }
            Self::InvalidInput { field, message } => {
                write!(f, "Invalid input for field '{field}': {message}")
            }
            Self::ResourceNotFound {
                resource_type,
                message,
            } => {
                write!(f, "{resource_type} not found: {message}")
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {message}")
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AuthenticationFailed { reason } => Self::AuthenticationFailed { reason },
            AuthError::Unauthorized {
                action,
                required_role,
            } => Self::Unauthorized {
                action,
                required_role,
            },
            not_owner @ AuthError::NotOwner { .. } => Self::PermissionDenied {
                message: not_owner.to_string(),
            },
        }
    }
}

/// Translates a domain error into an API error.
///
/// Invariant breaches inside the ledger surface as a generic internal error.
#[must_use]
pub fn translate_domain_error(err: DomainError) -> ApiError {
    match err {
        DomainError::InvalidStatusTransition { .. } => ApiError::DomainRuleViolation {
            rule: String::from("status_transition"),
            message: err.to_string(),
        },
        DomainError::UnknownValue { kind, .. } => ApiError::InvalidInput {
            field: kind.replace(' ', "_"),
            message: err.to_string(),
        },
        DomainError::InvalidAmount { .. } => ApiError::InvalidInput {
            field: String::from("amount"),
            message: err.to_string(),
        },
        DomainError::InvalidConfig { ref field, .. } => ApiError::InvalidInput {
            field: field.clone(),
            message: err.to_string(),
        },
        DomainError::InvalidPaymentDetails(msg) => ApiError::InvalidInput {
            field: String::from("payment"),
            message: msg,
        },
        DomainError::InvalidEmail(msg) => ApiError::InvalidInput {
            field: String::from("email"),
            message: msg,
        },
        DomainError::InvalidDisplayName(msg) => ApiError::InvalidInput {
            field: String::from("display_name"),
            message: msg,
        },
        DomainError::InvalidCurrency(_) => ApiError::InvalidInput {
            field: String::from("currency"),
            message: err.to_string(),
        },
        DomainError::BalanceUnderflow { .. }
        | DomainError::ArithmeticOverflow { .. }
        | DomainError::DateArithmeticOverflow { .. }
        | DomainError::ReservationMismatch { .. } => {
            error!(error = %err, "Ledger invariant violated");
            ApiError::internal()
        }
    }
}

/// Translates a core error into an API error.
///
/// Store failures are logged with their detail and returned as a generic
/// internal error.
#[must_use]
pub fn translate_core_error(err: CoreError) -> ApiError {
    match err {
        CoreError::InvalidArgument(message) => ApiError::InvalidInput {
            field: String::from("request"),
            message,
        },
        CoreError::NotFound { entity, id } => ApiError::ResourceNotFound {
            resource_type: entity.to_string(),
            message: format!("{entity} '{id}' does not exist"),
        },
        CoreError::PermissionDenied(message) => ApiError::PermissionDenied { message },
        CoreError::FailedPrecondition(message) => ApiError::DomainRuleViolation {
            rule: String::from("precondition"),
            message,
        },
        CoreError::Domain(domain_err) => translate_domain_error(domain_err),
        CoreError::Store(StoreError::NotFound { entity, id }) => ApiError::ResourceNotFound {
            resource_type: entity.to_string(),
            message: format!("{entity} '{id}' does not exist"),
        },
        CoreError::Store(store_err) => {
            error!(error = %store_err, "Store operation failed");
            ApiError::internal()
        }
    }
}
