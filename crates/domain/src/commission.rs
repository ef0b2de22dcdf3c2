// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Commission records and their lifecycle.
//!
//! A commission moves `pending -> validated -> available -> paid`, or
//! straight from `pending` to `available` when no release delay applies.
//! Any non-paid state may be cancelled. Every transition method returns the
//! [`BalanceDelta`] that must be applied to the referrer's balance in the
//! same transaction as the status write.

use crate::balance::{BalanceBucket, BalanceDelta};
use crate::config::CalculationType;
use crate::error::DomainError;
use crate::ids::{CommissionId, ProfileId, WithdrawalId};
use crate::money::{Cents, Rate};
use crate::profile::ProfileKind;
use crate::referral::ReferralScheme;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

str_enum! {
    /// The business event a commission pays for.
    pub enum CommissionType: "commission type" {
        /// A referred client signed up.
        Signup => "referral_signup",
        /// A referred client's first qualifying call.
        FirstCall => "referral_first_call",
        /// Any later call by a referred client.
        RecurringCall => "referral_recurring_call",
        /// First month of a referred client's subscription.
        Subscription => "referral_subscription",
        /// A subscription renewal month.
        SubscriptionRenewal => "referral_subscription_renewal",
        /// A call received by a recruited provider.
        ProviderCall => "provider_call",
        /// Per-call commission to the recruiting parent.
        N1Call => "n1_call",
        /// Per-call commission to the recruiting grandparent.
        N2Call => "n2_call",
        /// One-time bonus when a recruit crosses the first threshold.
        ThresholdFirst => "threshold_first",
        /// One-time bonus when a recruit crosses the second threshold.
        ThresholdSecond => "threshold_second",
        /// Milestone bonus for qualified recruit counts.
        TierBonus => "tier_bonus",
        /// Admin-issued credit.
        Manual => "manual_adjustment",
    }
}

impl CommissionType {
    /// The kind of source event this commission type is keyed on.
    #[must_use]
    pub const fn source_type(&self) -> SourceType {
        match self {
            Self::Signup => SourceType::Signup,
            Self::FirstCall
            | Self::RecurringCall
            | Self::ProviderCall
            | Self::N1Call
            | Self::N2Call => SourceType::Call,
            Self::Subscription | Self::SubscriptionRenewal => SourceType::Subscription,
            Self::ThresholdFirst | Self::ThresholdSecond | Self::TierBonus => SourceType::Bonus,
            Self::Manual => SourceType::Manual,
        }
    }

    /// True for earnings generated by the referrer's own clients or providers.
    #[must_use]
    pub const fn is_client_generated(&self) -> bool {
        matches!(
            self,
            Self::Signup
                | Self::FirstCall
                | Self::RecurringCall
                | Self::Subscription
                | Self::SubscriptionRenewal
                | Self::ProviderCall
        )
    }

    /// The referral scheme whose edge accumulates this commission's amount.
    #[must_use]
    pub const fn referral_scheme(&self) -> Option<ReferralScheme> {
        match self {
            Self::Signup
            | Self::FirstCall
            | Self::RecurringCall
            | Self::Subscription
            | Self::SubscriptionRenewal => Some(ReferralScheme::Client),
            Self::ProviderCall => Some(ReferralScheme::ProviderRecruitment),
            Self::N1Call | Self::ThresholdFirst | Self::ThresholdSecond => {
                Some(ReferralScheme::AffiliateRecruitment)
            }
            Self::N2Call | Self::TierBonus | Self::Manual => None,
        }
    }
}

str_enum! {
    /// The category of event a commission was created from.
    pub enum SourceType: "source type" {
        Call => "call",
        Subscription => "subscription",
        Signup => "signup",
        Manual => "manual",
        Bonus => "bonus",
    }
}

str_enum! {
    /// Commission lifecycle states.
    pub enum CommissionStatus: "commission status" {
        /// Inside the hold period.
        Pending => "pending",
        /// Hold period passed, release delay running.
        Validated => "validated",
        /// Eligible for withdrawal.
        Available => "available",
        /// Reserved by a withdrawal.
        Paid => "paid",
        /// Cancelled by an admin. Terminal.
        Cancelled => "cancelled",
    }
}

impl CommissionStatus {
    /// Returns true if this status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    /// The balance bucket holding a commission in this status, if any.
    #[must_use]
    pub const fn bucket(&self) -> Option<BalanceBucket> {
        match self {
            Self::Pending => Some(BalanceBucket::Pending),
            Self::Validated => Some(BalanceBucket::Validated),
            Self::Available => Some(BalanceBucket::Available),
            Self::Paid | Self::Cancelled => None,
        }
    }

    /// Validates if a transition from this status to another is permitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not allowed.
    pub fn validate_transition(&self, new_status: Self) -> Result<(), DomainError> {
        if self.is_terminal() {
            return Err(transition_error(
                *self,
                new_status,
                "cannot transition from terminal state",
            ));
        }

        let valid: bool = match self {
            Self::Pending => matches!(
                new_status,
                Self::Validated | Self::Available | Self::Cancelled
            ),
            Self::Validated => matches!(new_status, Self::Available | Self::Cancelled),
            Self::Available => matches!(new_status, Self::Paid | Self::Cancelled),
            Self::Paid | Self::Cancelled => false,
        };

        if valid {
            Ok(())
        } else {
            Err(transition_error(
                *self,
                new_status,
                "transition not permitted by commission lifecycle rules",
            ))
        }
    }
}

fn transition_error(from: CommissionStatus, to: CommissionStatus, reason: &str) -> DomainError {
    DomainError::InvalidStatusTransition {
        entity: "commission",
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
        reason: reason.to_string(),
    }
}

/// How an amount was computed. Stored verbatim on the commission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationDetails {
    pub calculation_type: CalculationType,
    /// Base amount the rate was applied to, if any.
    pub base_amount: Option<Cents>,
    /// Rate applied to the base, if any.
    pub rate_applied: Option<Rate>,
    /// Fixed component, if any.
    pub fixed_component: Option<Cents>,
    /// Whether the amounts came from the referrer's captured rates.
    pub used_captured_rates: bool,
    /// Human-readable breakdown, e.g. `10.00% of 20.00 EUR = 2.00 EUR`.
    pub breakdown: String,
}

/// A recorded amount correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub previous_amount: Cents,
    pub new_amount: Cents,
    pub actor_id: String,
    pub reason: String,
    #[serde(with = "time::serde::rfc3339")]
    pub adjusted_at: OffsetDateTime,
}

/// Dedupe key used for the first-call commission.
///
/// At most one first-call commission exists per referrer and referee no
/// matter which call produced it.
pub const FIRST_CALL_DEDUPE_KEY: &str = "first_call";

/// The idempotency key of a commission.
///
/// Two commissions with the same key can never both exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceKey {
    pub referrer_id: ProfileId,
    pub referee_id: ProfileId,
    pub commission_type: CommissionType,
    pub dedupe_key: String,
}

impl SourceKey {
    /// Builds the key for an event.
    ///
    /// # Arguments
    ///
    /// * `referrer_id` - The profile being credited
    /// * `referee_id` - The profile whose activity generated the credit
    /// * `commission_type` - The commission type
    /// * `source_id` - The source event identifier
    #[must_use]
    pub fn new(
        referrer_id: ProfileId,
        referee_id: ProfileId,
        commission_type: CommissionType,
        source_id: &str,
    ) -> Self {
        let dedupe_key: String = if commission_type == CommissionType::FirstCall {
            FIRST_CALL_DEDUPE_KEY.to_string()
        } else {
            source_id.to_string()
        };
        Self {
            referrer_id,
            referee_id,
            commission_type,
            dedupe_key,
        }
    }
}

/// The hold schedule of a new commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldSchedule {
    pub status: CommissionStatus,
    /// When the validate pass may pick the commission up.
    pub hold_until: OffsetDateTime,
    /// When the commission becomes withdrawable.
    pub available_at: OffsetDateTime,
}

impl HoldSchedule {
    /// Computes the schedule for a commission created at `now`.
    ///
    /// A zero hold period makes the commission available immediately.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DateArithmeticOverflow` if the due times overflow.
    pub fn compute(
        now: OffsetDateTime,
        hold_period_hours: u32,
        release_delay_hours: u32,
    ) -> Result<Self, DomainError> {
        if hold_period_hours == 0 {
            return Ok(Self {
                status: CommissionStatus::Available,
                hold_until: now,
                available_at: now,
            });
        }
        let hold_until: OffsetDateTime = now
            .checked_add(Duration::hours(i64::from(hold_period_hours)))
            .ok_or_else(|| DomainError::DateArithmeticOverflow {
                operation: String::from("computing hold period end"),
            })?;
        let available_at: OffsetDateTime = hold_until
            .checked_add(Duration::hours(i64::from(release_delay_hours)))
            .ok_or_else(|| DomainError::DateArithmeticOverflow {
                operation: String::from("computing release time"),
            })?;
        Ok(Self {
            status: CommissionStatus::Pending,
            hold_until,
            available_at,
        })
    }
}

/// A single monetary credit owed to a referrer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commission {
    pub id: CommissionId,
    pub referrer_id: ProfileId,
    pub referrer_kind: ProfileKind,
    pub referee_id: ProfileId,
    pub commission_type: CommissionType,
    pub source_type: SourceType,
    pub source_id: String,
    pub dedupe_key: String,
    pub amount: Cents,
    pub currency: String,
    pub calculation: CalculationDetails,
    pub status: CommissionStatus,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub hold_until: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub available_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub validated_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub released_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub paid_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub cancelled_at: Option<OffsetDateTime>,
    pub cancelled_by: Option<String>,
    pub cancellation_reason: Option<String>,
    pub withdrawal_id: Option<WithdrawalId>,
    #[serde(default)]
    pub adjustments: Vec<Adjustment>,
}

impl Commission {
    /// The idempotency key of this commission.
    #[must_use]
    pub fn source_key(&self) -> SourceKey {
        SourceKey {
            referrer_id: self.referrer_id.clone(),
            referee_id: self.referee_id.clone(),
            commission_type: self.commission_type,
            dedupe_key: self.dedupe_key.clone(),
        }
    }

    /// The delta that credits this commission at creation.
    ///
    /// # Errors
    ///
    /// Returns an error if the commission was not created in a holding status.
    pub fn creation_delta(&self) -> Result<BalanceDelta, DomainError> {
        let bucket: BalanceBucket = self.holding_bucket()?;
        Ok(BalanceDelta::credit(bucket, self.amount))
    }

    fn holding_bucket(&self) -> Result<BalanceBucket, DomainError> {
        self.status
            .bucket()
            .ok_or_else(|| DomainError::InvalidStatusTransition {
                entity: "commission",
                from: self.status.as_str().to_string(),
                to: self.status.as_str().to_string(),
                reason: String::from("commission does not hold a balance"),
            })
    }

    /// True if the validate pass should pick this commission up at `now`.
    #[must_use]
    pub fn is_due_for_validation(&self, now: OffsetDateTime) -> bool {
        self.status == CommissionStatus::Pending && self.hold_until <= now
    }

    /// True if the release pass should pick this commission up at `now`.
    #[must_use]
    pub fn is_due_for_release(&self, now: OffsetDateTime) -> bool {
        self.status == CommissionStatus::Validated && self.available_at <= now
    }

    /// Advances a pending commission past its hold period.
    ///
    /// Goes straight to `available` when the release time has also passed.
    ///
    /// # Errors
    ///
    /// Returns an error if the commission is not pending.
    pub fn validate(&mut self, now: OffsetDateTime) -> Result<BalanceDelta, DomainError> {
        let target: CommissionStatus = if self.available_at <= now {
            CommissionStatus::Available
        } else {
            CommissionStatus::Validated
        };
        if self.status != CommissionStatus::Pending {
            return Err(transition_error(
                self.status,
                target,
                "only pending commissions can be validated",
            ));
        }
        self.validated_at = Some(now);
        if target == CommissionStatus::Available {
            self.released_at = Some(now);
        }
        self.move_to(target)
    }

    /// Releases a validated commission.
    ///
    /// # Errors
    ///
    /// Returns an error if the commission is not validated.
    pub fn release(&mut self, now: OffsetDateTime) -> Result<BalanceDelta, DomainError> {
        if self.status != CommissionStatus::Validated {
            return Err(transition_error(
                self.status,
                CommissionStatus::Available,
                "only validated commissions can be released",
            ));
        }
        self.released_at = Some(now);
        self.move_to(CommissionStatus::Available)
    }

    /// Reserves an available commission for a withdrawal.
    ///
    /// # Errors
    ///
    /// Returns an error if the commission is not available.
    pub fn reserve(
        &mut self,
        withdrawal_id: &WithdrawalId,
        now: OffsetDateTime,
    ) -> Result<BalanceDelta, DomainError> {
        self.status.validate_transition(CommissionStatus::Paid)?;
        let delta: BalanceDelta = BalanceDelta::debit(BalanceBucket::Available, self.amount);
        self.status = CommissionStatus::Paid;
        self.paid_at = Some(now);
        self.withdrawal_id = Some(withdrawal_id.clone());
        Ok(delta)
    }

    /// Returns a reserved commission to the available bucket.
    ///
    /// This is the only way out of `paid` and is reserved for compensating a
    /// withdrawal that was rejected or whose transfer failed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ReservationMismatch` unless the commission is paid
    /// and reserved by `withdrawal_id`.
    pub fn release_reservation(
        &mut self,
        withdrawal_id: &WithdrawalId,
    ) -> Result<BalanceDelta, DomainError> {
        if self.status != CommissionStatus::Paid
            || self.withdrawal_id.as_ref() != Some(withdrawal_id)
        {
            return Err(DomainError::ReservationMismatch {
                commission_id: self.id.to_string(),
                withdrawal_id: withdrawal_id.to_string(),
            });
        }
        self.status = CommissionStatus::Available;
        self.paid_at = None;
        self.withdrawal_id = None;
        Ok(BalanceDelta::credit(BalanceBucket::Available, self.amount).without_total())
    }

    /// Cancels a commission that has not been paid.
    ///
    /// The lifetime total is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the commission is already paid or cancelled.
    pub fn cancel(
        &mut self,
        actor_id: &str,
        reason: &str,
        now: OffsetDateTime,
    ) -> Result<BalanceDelta, DomainError> {
        self.status.validate_transition(CommissionStatus::Cancelled)?;
        let bucket: BalanceBucket = self.holding_bucket()?;
        self.status = CommissionStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.cancelled_by = Some(actor_id.to_string());
        self.cancellation_reason = Some(reason.to_string());
        Ok(BalanceDelta::debit(bucket, self.amount))
    }

    /// Changes the amount of a commission that has not been paid or cancelled.
    ///
    /// Returns the delta and the signed amount change.
    ///
    /// # Errors
    ///
    /// Returns an error if the commission is terminal or the new amount is negative.
    pub fn adjust(
        &mut self,
        new_amount: Cents,
        actor_id: &str,
        reason: &str,
        now: OffsetDateTime,
    ) -> Result<(BalanceDelta, Cents), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStatusTransition {
                entity: "commission",
                from: self.status.as_str().to_string(),
                to: self.status.as_str().to_string(),
                reason: String::from("paid or cancelled commissions cannot be adjusted"),
            });
        }
        if new_amount < 0 {
            return Err(DomainError::InvalidAmount {
                amount: new_amount,
                reason: String::from("commission amount cannot be negative"),
            });
        }
        let bucket: BalanceBucket = self.holding_bucket()?;
        let change: Cents =
            new_amount
                .checked_sub(self.amount)
                .ok_or_else(|| DomainError::ArithmeticOverflow {
                    operation: String::from("computing adjustment delta"),
                })?;
        self.adjustments.push(Adjustment {
            previous_amount: self.amount,
            new_amount,
            actor_id: actor_id.to_string(),
            reason: reason.to_string(),
            adjusted_at: now,
        });
        self.amount = new_amount;
        Ok((BalanceDelta::credit(bucket, change), change))
    }

    fn move_to(&mut self, target: CommissionStatus) -> Result<BalanceDelta, DomainError> {
        let from: BalanceBucket = self.holding_bucket()?;
        self.status = target;
        let to: BalanceBucket = self.holding_bucket()?;
        Ok(BalanceDelta::transfer(from, to, self.amount))
    }
}
