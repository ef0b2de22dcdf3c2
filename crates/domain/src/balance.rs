// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Referrer balances and per-type running statistics.
//!
//! Balances are embedded in the referrer's profile. They are never written
//! directly; every change is expressed as a [`BalanceDelta`] produced by a
//! commission or withdrawal transition and applied in the same transaction
//! as that transition.

use crate::commission::CommissionType;
use crate::error::DomainError;
use crate::money::Cents;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The balance bucket currently holding a commission's amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceBucket {
    /// Held during the anti-fraud hold period.
    Pending,
    /// Validated, waiting for the release delay.
    Validated,
    /// Eligible for withdrawal.
    Available,
}

impl BalanceBucket {
    /// Returns the string representation of the bucket.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Available => "available",
        }
    }
}

/// A referrer's balance buckets and lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Commissions still inside their hold period.
    pub pending: Cents,
    /// Commissions past the hold period but not yet released.
    pub validated: Cents,
    /// Commissions eligible for withdrawal.
    pub available: Cents,
    /// Gross commissions ever credited. Unaffected by cancellation.
    pub total_earned: Cents,
    /// Amount paid out by completed withdrawals.
    pub total_withdrawn: Cents,
}

impl Balance {
    /// Returns the amount held in a bucket.
    #[must_use]
    pub const fn bucket(&self, bucket: BalanceBucket) -> Cents {
        match bucket {
            BalanceBucket::Pending => self.pending,
            BalanceBucket::Validated => self.validated,
            BalanceBucket::Available => self.available,
        }
    }

    /// Applies a delta, refusing any change that would leave a field negative.
    ///
    /// The balance is left untouched when an error is returned.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::BalanceUnderflow` if any field would go negative,
    /// or `DomainError::ArithmeticOverflow` if any field would overflow.
    pub fn apply(&mut self, delta: &BalanceDelta) -> Result<(), DomainError> {
        let next: Self = Self {
            pending: checked_field("pending", self.pending, delta.pending)?,
            validated: checked_field("validated", self.validated, delta.validated)?,
            available: checked_field("available", self.available, delta.available)?,
            total_earned: checked_field("total_earned", self.total_earned, delta.total_earned)?,
            total_withdrawn: checked_field(
                "total_withdrawn",
                self.total_withdrawn,
                delta.total_withdrawn,
            )?,
        };
        *self = next;
        Ok(())
    }

    /// Sum of the three holding buckets, saturating at the numeric bounds.
    #[must_use]
    pub const fn held(&self) -> Cents {
        self.pending
            .saturating_add(self.validated)
            .saturating_add(self.available)
    }
}

fn checked_field(name: &'static str, current: Cents, delta: Cents) -> Result<Cents, DomainError> {
    let next: Cents = current
        .checked_add(delta)
        .ok_or_else(|| DomainError::ArithmeticOverflow {
            operation: format!("balance field {name}"),
        })?;
    if next < 0 {
        return Err(DomainError::BalanceUnderflow {
            bucket: name,
            current,
            delta,
        });
    }
    Ok(next)
}

/// A signed change to a [`Balance`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub pending: Cents,
    pub validated: Cents,
    pub available: Cents,
    pub total_earned: Cents,
    pub total_withdrawn: Cents,
}

impl BalanceDelta {
    /// A freshly created commission: credits the bucket and the lifetime total.
    #[must_use]
    pub fn credit(bucket: BalanceBucket, amount: Cents) -> Self {
        let mut delta: Self = Self::default();
        delta.add_to(bucket, amount);
        delta.total_earned = amount;
        delta
    }

    /// Removes an amount from a bucket without touching lifetime totals.
    #[must_use]
    pub fn debit(bucket: BalanceBucket, amount: Cents) -> Self {
        let mut delta: Self = Self::default();
        delta.add_to(bucket, -amount);
        delta
    }

    /// Moves an amount from one bucket to another.
    #[must_use]
    pub fn transfer(from: BalanceBucket, to: BalanceBucket, amount: Cents) -> Self {
        let mut delta: Self = Self::default();
        delta.add_to(from, -amount);
        delta.add_to(to, amount);
        delta
    }

    /// Drops the lifetime-total component of a credit.
    #[must_use]
    pub const fn without_total(mut self) -> Self {
        self.total_earned = 0;
        self
    }

    /// Records a completed payout.
    #[must_use]
    pub fn withdrawn(amount: Cents) -> Self {
        Self {
            total_withdrawn: amount,
            ..Self::default()
        }
    }

    const fn add_to(&mut self, bucket: BalanceBucket, amount: Cents) {
        match bucket {
            BalanceBucket::Pending => self.pending += amount,
            BalanceBucket::Validated => self.validated += amount,
            BalanceBucket::Available => self.available += amount,
        }
    }

    /// Folds another delta into this one.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ArithmeticOverflow` if any field overflows.
    pub fn combine(&mut self, other: &Self) -> Result<(), DomainError> {
        let add = |a: Cents, b: Cents| {
            a.checked_add(b)
                .ok_or_else(|| DomainError::ArithmeticOverflow {
                    operation: String::from("combining balance deltas"),
                })
        };
        *self = Self {
            pending: add(self.pending, other.pending)?,
            validated: add(self.validated, other.validated)?,
            available: add(self.available, other.available)?,
            total_earned: add(self.total_earned, other.total_earned)?,
            total_withdrawn: add(self.total_withdrawn, other.total_withdrawn)?,
        };
        Ok(())
    }

    /// Returns true if applying this delta changes nothing.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Running count and amount for one commission type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStats {
    pub count: u64,
    pub amount: Cents,
}

/// Per-profile running statistics maintained alongside the balance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateStats {
    /// Gross totals keyed by commission type.
    pub by_type: BTreeMap<CommissionType, TypeStats>,
    /// Earnings generated by this profile's own clients, net of cancellations.
    ///
    /// Referral-derived earnings (N1, N2, thresholds, tiers) are excluded.
    pub direct_client_earnings: Cents,
    /// Number of recruited affiliates that crossed the first threshold.
    pub qualified_referrals: u32,
}

impl AffiliateStats {
    /// Records a newly created commission.
    pub fn record_created(&mut self, commission_type: CommissionType, amount: Cents) {
        let entry: &mut TypeStats = self.by_type.entry(commission_type).or_default();
        entry.count += 1;
        entry.amount += amount;
        if commission_type.is_client_generated() {
            self.direct_client_earnings += amount;
        }
    }

    /// Records an amount adjustment on an existing commission.
    pub fn record_adjusted(&mut self, commission_type: CommissionType, delta: Cents) {
        self.by_type.entry(commission_type).or_default().amount += delta;
        if commission_type.is_client_generated() {
            self.direct_client_earnings += delta;
        }
    }

    /// Records a cancellation. Only the net client earnings move.
    pub fn record_cancelled(&mut self, commission_type: CommissionType, amount: Cents) {
        if commission_type.is_client_generated() {
            self.direct_client_earnings -= amount;
        }
    }

    /// Returns the stats for one type.
    #[must_use]
    pub fn for_type(&self, commission_type: CommissionType) -> TypeStats {
        self.by_type
            .get(&commission_type)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_increments_bucket_and_total() {
        let mut balance: Balance = Balance::default();
        balance
            .apply(&BalanceDelta::credit(BalanceBucket::Pending, 500))
            .unwrap();

        assert_eq!(balance.pending, 500);
        assert_eq!(balance.total_earned, 500);
        assert_eq!(balance.available, 0);
    }

    #[test]
    fn test_transfer_moves_between_buckets() {
        let mut balance: Balance = Balance {
            pending: 500,
            total_earned: 500,
            ..Balance::default()
        };
        balance
            .apply(&BalanceDelta::transfer(
                BalanceBucket::Pending,
                BalanceBucket::Available,
                500,
            ))
            .unwrap();

        assert_eq!(balance.pending, 0);
        assert_eq!(balance.available, 500);
        assert_eq!(balance.total_earned, 500);
    }

    #[test]
    fn test_underflow_is_rejected_and_balance_unchanged() {
        let mut balance: Balance = Balance {
            available: 100,
            total_earned: 100,
            ..Balance::default()
        };
        let result = balance.apply(&BalanceDelta::debit(BalanceBucket::Available, 101));

        assert!(matches!(
            result,
            Err(DomainError::BalanceUnderflow {
                bucket: "available",
                ..
            })
        ));
        assert_eq!(balance.available, 100);
    }

    #[test]
    fn test_combined_deltas_roll_up() {
        let mut delta: BalanceDelta = BalanceDelta::default();
        for _ in 0..3 {
            delta
                .combine(&BalanceDelta::transfer(
                    BalanceBucket::Pending,
                    BalanceBucket::Validated,
                    200,
                ))
                .unwrap();
        }

        assert_eq!(delta.pending, -600);
        assert_eq!(delta.validated, 600);
        assert!(!delta.is_zero());
    }

    #[test]
    fn test_stats_exclude_referral_derived_types_from_client_earnings() {
        let mut stats: AffiliateStats = AffiliateStats::default();
        stats.record_created(CommissionType::FirstCall, 1_000);
        stats.record_created(CommissionType::N1Call, 100);
        stats.record_created(CommissionType::ThresholdFirst, 5_000);

        assert_eq!(stats.direct_client_earnings, 1_000);
        assert_eq!(stats.for_type(CommissionType::N1Call).count, 1);
        assert_eq!(stats.for_type(CommissionType::ThresholdFirst).amount, 5_000);
    }

    #[test]
    fn test_cancellation_reduces_client_earnings_only() {
        let mut stats: AffiliateStats = AffiliateStats::default();
        stats.record_created(CommissionType::RecurringCall, 500);
        stats.record_cancelled(CommissionType::RecurringCall, 500);

        assert_eq!(stats.direct_client_earnings, 0);
        assert_eq!(stats.for_type(CommissionType::RecurringCall).amount, 500);
    }
}
