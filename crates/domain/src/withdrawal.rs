// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Withdrawal requests and their lifecycle.
//!
//! `pending -> approved -> processing -> completed`, with `rejected`
//! reachable from `pending`/`approved` and `failed` from `processing`.

use crate::commission::{Commission, CommissionStatus};
use crate::error::DomainError;
use crate::ids::{CommissionId, ProfileId, WithdrawalId};
use crate::money::{Cents, validate_currency};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, Time};

str_enum! {
    /// Withdrawal lifecycle states.
    pub enum WithdrawalStatus: "withdrawal status" {
        Pending => "pending",
        Approved => "approved",
        Processing => "processing",
        Completed => "completed",
        Rejected => "rejected",
        Failed => "failed",
    }
}

impl WithdrawalStatus {
    /// Returns true if this status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Failed)
    }

    /// Validates if a transition from this status to another is permitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not allowed.
    pub fn validate_transition(&self, new_status: Self) -> Result<(), DomainError> {
        let valid: bool = match self {
            Self::Pending => matches!(new_status, Self::Approved | Self::Rejected),
            Self::Approved => matches!(new_status, Self::Processing | Self::Rejected),
            Self::Processing => matches!(new_status, Self::Completed | Self::Failed),
            Self::Completed | Self::Rejected | Self::Failed => false,
        };
        if valid {
            Ok(())
        } else {
            Err(DomainError::InvalidStatusTransition {
                entity: "withdrawal",
                from: self.as_str().to_string(),
                to: new_status.as_str().to_string(),
                reason: if self.is_terminal() {
                    String::from("cannot transition from terminal state")
                } else {
                    String::from("transition not permitted by withdrawal lifecycle rules")
                },
            })
        }
    }
}

str_enum! {
    /// Whether a transfer failure may succeed on a later attempt.
    pub enum FailureKind: "failure kind" {
        Transient => "transient",
        Terminal => "terminal",
    }
}

/// Diagnostic attached to a failed withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFailure {
    pub kind: FailureKind,
    /// The saga step that failed, e.g. `create_transfer`.
    pub step: String,
    pub reason: String,
}

/// Bank details for a payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub account_holder: String,
    pub iban: String,
    pub bic: Option<String>,
    /// ISO 3166 alpha-2 country code.
    pub country: String,
    /// Currency the recipient is paid in.
    pub currency: String,
}

impl PaymentDetails {
    /// Validates the details.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidPaymentDetails` describing the first problem.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.account_holder.trim().is_empty() {
            return Err(DomainError::InvalidPaymentDetails(String::from(
                "account holder is required",
            )));
        }
        let iban: String = self.normalized_iban();
        if iban.len() < 15 || iban.len() > 34 || !iban.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::InvalidPaymentDetails(String::from(
                "IBAN must be 15 to 34 alphanumeric characters",
            )));
        }
        if self.country.len() != 2 || !self.country.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DomainError::InvalidPaymentDetails(String::from(
                "country must be a two letter code",
            )));
        }
        validate_currency(&self.currency)
            .map_err(|_| DomainError::InvalidPaymentDetails(String::from("invalid currency")))?;
        Ok(())
    }

    fn normalized_iban(&self) -> String {
        self.iban
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase()
    }

    /// Stable fingerprint used to decide whether a cached recipient is reusable.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}",
            self.normalized_iban(),
            self.account_holder.trim().to_lowercase(),
            self.currency
        )
    }
}

/// Identifiers collected while the transfer saga runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub recipient_id: Option<String>,
    pub quote_id: Option<String>,
    pub transfer_id: Option<String>,
    /// Last status reported by the provider.
    pub provider_status: Option<String>,
}

/// One entry of a withdrawal's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: WithdrawalStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub actor_id: Option<String>,
    pub note: Option<String>,
}

/// A request to pay out available balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub referrer_id: ProfileId,
    pub requested_amount: Cents,
    /// Sum of the reserved commissions.
    pub amount: Cents,
    pub currency: String,
    pub commission_ids: Vec<CommissionId>,
    pub status: WithdrawalStatus,
    pub payment: PaymentDetails,
    pub requires_review: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub approved_at: Option<OffsetDateTime>,
    pub approved_by: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub processing_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub rejected_at: Option<OffsetDateTime>,
    pub rejection_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub failed_at: Option<OffsetDateTime>,
    pub failure: Option<TransferFailure>,
    pub transfer: TransferProgress,
    /// Set once reserved commissions were returned to the available bucket.
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub funds_released_at: Option<OffsetDateTime>,
    pub funds_released_by: Option<String>,
    pub status_history: Vec<StatusChange>,
}

impl Withdrawal {
    /// True while the withdrawal blocks new requests from the same referrer.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Moves the withdrawal to a new status, stamping timestamps and history.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not permitted.
    pub fn transition(
        &mut self,
        to: WithdrawalStatus,
        actor_id: Option<&str>,
        note: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        self.status.validate_transition(to)?;
        match to {
            WithdrawalStatus::Approved => {
                self.approved_at = Some(now);
                self.approved_by = actor_id.map(ToString::to_string);
            }
            WithdrawalStatus::Processing => self.processing_at = Some(now),
            WithdrawalStatus::Completed => self.completed_at = Some(now),
            WithdrawalStatus::Rejected => {
                self.rejected_at = Some(now);
                self.rejection_reason = note.map(ToString::to_string);
            }
            WithdrawalStatus::Failed => self.failed_at = Some(now),
            WithdrawalStatus::Pending => {}
        }
        self.status = to;
        self.status_history.push(StatusChange {
            status: to,
            at: now,
            actor_id: actor_id.map(ToString::to_string),
            note: note.map(ToString::to_string),
        });
        Ok(())
    }

    /// True if the reserved commissions may be returned to the balance.
    ///
    /// Only failed withdrawals qualify, and only once.
    #[must_use]
    pub const fn can_release_funds(&self) -> bool {
        matches!(self.status, WithdrawalStatus::Failed) && self.funds_released_at.is_none()
    }
}

/// Commissions chosen to back a withdrawal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommissionSelection {
    pub commission_ids: Vec<CommissionId>,
    pub total: Cents,
}

/// Selects available commissions in FIFO order without exceeding `target`.
///
/// Commissions that would overshoot the target are skipped and later,
/// smaller ones are still considered.
#[must_use]
pub fn select_commissions_fifo(available: &[Commission], target: Cents) -> CommissionSelection {
    let mut selection: CommissionSelection = CommissionSelection::default();
    for commission in available {
        if commission.status != CommissionStatus::Available || commission.amount <= 0 {
            continue;
        }
        let Some(next) = selection.total.checked_add(commission.amount) else {
            continue;
        };
        if next <= target {
            selection.total = next;
            selection.commission_ids.push(commission.id.clone());
        }
        if selection.total == target {
            break;
        }
    }
    selection
}

/// Start of the calendar month containing `now`, in UTC.
#[must_use]
pub fn month_start(now: OffsetDateTime) -> OffsetDateTime {
    let utc: OffsetDateTime = now.to_offset(time::UtcOffset::UTC);
    let first: Date = utc.date().replace_day(1).unwrap_or_else(|_| utc.date());
    first.with_time(Time::MIDNIGHT).assume_utc()
}
