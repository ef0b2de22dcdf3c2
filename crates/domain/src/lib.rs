// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Domain types and pure rules of the affiliate commission engine.
//!
//! Nothing in this crate performs I/O. State transitions return the
//! balance deltas they imply; applying them atomically is the job of the
//! ledger in the core crate.

#![deny(
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    clippy::style,
    clippy::correctness,
    clippy::all,
    clippy::suspicious,
    clippy::complexity,
    clippy::perf,
    clippy::unwrap_used,
    clippy::expect_used
)]

/// Declares a string-backed enum with `as_str`, `FromStr`, `Display` and a
/// matching serde representation.
///
/// The string forms are what gets persisted and indexed, so they must never
/// change once released.
macro_rules! str_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $kind:literal {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $text:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Returns the string representation used for persistence.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(crate::error::DomainError::UnknownValue {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

mod attribution;
mod balance;
mod calculator;
mod commission;
mod conditions;
mod config;
mod error;
mod fraud;
mod ids;
mod money;
mod profile;
mod referral;
mod subscription;
mod withdrawal;

#[cfg(test)]
mod tests;

pub use attribution::{
    PendingReferral, SharedSignal, WindowCheck, canonical_email, check_attribution_window,
    shared_signals,
};
pub use balance::{AffiliateStats, Balance, BalanceBucket, BalanceDelta, TypeStats};
pub use calculator::{BaseAmounts, CalculatedAmount, CalculationError, calculate};
pub use commission::{
    Adjustment, CalculationDetails, Commission, CommissionStatus, CommissionType,
    FIRST_CALL_DEDUPE_KEY, HoldSchedule, SourceKey, SourceType,
};
pub use conditions::{ConditionUsage, EvaluationContext, evaluate_conditions};
pub use config::{
    AffiliateConfig, ApplyTo, CalculationType, CapturedRates, CommissionRule, ConfigUpdate,
    FraudSettings, RateCard, RateHistoryEntry, ReferralProgramSettings, RuleConditions, TierBonus,
    WithdrawalSettings,
};
pub use error::DomainError;
pub use fraud::{
    FraudAlert, FraudAssessment, FraudDecision, FraudIssue, FraudSignals,
    email_similarity_percent, is_blocked_domain, levenshtein, score_signals,
};
pub use ids::{CommissionId, ProfileId, WithdrawalId, generate_id};
pub use money::{Cents, Rate, format_amount, validate_currency};
pub use profile::{
    AffiliateProfile, CodeSlot, FraudStatus, PayoutRecipient, ProfileKind, ProfileStatus,
    ReferralCode, SignupSignals, generate_codes, normalize_code, validate_display_name,
    validate_email,
};
pub use referral::{
    Referral, ReferralScheme, ThresholdLevel, pending_thresholds, tier_source_id,
    unpaid_milestones,
};
pub use subscription::{add_months, days_in_month, subscription_month_index};
pub use withdrawal::{
    CommissionSelection, FailureKind, PaymentDetails, StatusChange, TransferFailure,
    TransferProgress, Withdrawal, WithdrawalStatus, month_start, select_commissions_fifo,
};
