// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

/// Errors that can occur during domain validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A status transition is not permitted by the lifecycle rules.
    InvalidStatusTransition {
        /// The kind of entity being transitioned (e.g. "commission").
        entity: &'static str,
        /// The current status.
        from: String,
        /// The requested status.
        to: String,
        /// Why the transition was refused.
        reason: String,
    },
    /// A persisted or user-supplied enum value could not be parsed.
    UnknownValue {
        /// The enum being parsed.
        kind: &'static str,
        /// The raw value.
        value: String,
    },
    /// Applying a balance delta would drive a bucket negative.
    BalanceUnderflow {
        /// The bucket that would underflow.
        bucket: &'static str,
        /// The bucket's current value.
        current: i64,
        /// The delta that was applied.
        delta: i64,
    },
    /// Integer arithmetic overflowed.
    ArithmeticOverflow {
        /// Description of the operation that failed.
        operation: String,
    },
    /// Date arithmetic overflow.
    DateArithmeticOverflow {
        /// Description of the operation that failed.
        operation: String,
    },
    /// A monetary amount is invalid for the requested operation.
    InvalidAmount {
        /// The offending amount in minor units.
        amount: i64,
        /// Why the amount was rejected.
        reason: String,
    },
    /// A configuration value is invalid.
    InvalidConfig {
        /// The configuration field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// Payout details are incomplete or malformed.
    InvalidPaymentDetails(String),
    /// Email address is empty or malformed.
    InvalidEmail(String),
    /// Display name is empty or invalid.
    InvalidDisplayName(String),
    /// Currency code is not a three letter ISO code.
    InvalidCurrency(String),
    /// A commission is not reserved by the given withdrawal.
    ReservationMismatch {
        /// The commission being released.
        commission_id: String,
        /// The withdrawal that attempted the release.
        withdrawal_id: String,
    },
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidStatusTransition {
                entity,
                from,
                to,
                reason,
            } => {
                write!(
                    f,
                    "Invalid {entity} status transition from '{from}' to '{to}': {reason}"
                )
            }
            Self::UnknownValue { kind, value } => write!(f, "Unknown {kind}: '{value}'"),
            Self::BalanceUnderflow {
                bucket,
                current,
                delta,
            } => {
                write!(
                    f,
                    "Balance bucket '{bucket}' would go negative ({current} + {delta})"
                )
            }
            Self::ArithmeticOverflow { operation } => {
                write!(f, "Arithmetic overflow during {operation}")
            }
            Self::DateArithmeticOverflow { operation } => {
                write!(f, "Date arithmetic overflow during {operation}")
            }
            Self::InvalidAmount { amount, reason } => {
                write!(f, "Invalid amount {amount}: {reason}")
            }
            Self::InvalidConfig { field, reason } => {
                write!(f, "Invalid configuration for '{field}': {reason}")
            }
            Self::InvalidPaymentDetails(msg) => write!(f, "Invalid payment details: {msg}"),
            Self::InvalidEmail(msg) => write!(f, "Invalid email: {msg}"),
            Self::InvalidDisplayName(msg) => write!(f, "Invalid display name: {msg}"),
            Self::InvalidCurrency(code) => write!(f, "Invalid currency code: '{code}'"),
            Self::ReservationMismatch {
                commission_id,
                withdrawal_id,
            } => {
                write!(
                    f,
                    "Commission {commission_id} is not reserved by withdrawal {withdrawal_id}"
                )
            }
        }
    }
}

impl std::error::Error for DomainError {}
