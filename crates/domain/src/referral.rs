// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Referral edges, recruitment thresholds and tier milestones.

use crate::commission::CommissionType;
use crate::config::{ReferralProgramSettings, TierBonus};
use crate::ids::ProfileId;
use crate::money::Cents;
use crate::profile::{CodeSlot, ProfileKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;

str_enum! {
    /// The program a referral edge belongs to.
    pub enum ReferralScheme: "referral scheme" {
        /// Referrer brought in a client.
        Client => "client",
        /// Referrer brought in a provider.
        ProviderRecruitment => "provider_recruitment",
        /// Referrer recruited another affiliate.
        AffiliateRecruitment => "affiliate_recruitment",
    }
}

impl ReferralScheme {
    /// The scheme a referee of the given kind joins through.
    #[must_use]
    pub const fn for_referee(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Client => Self::Client,
            ProfileKind::Provider => Self::ProviderRecruitment,
            ProfileKind::Chatter
            | ProfileKind::Blogger
            | ProfileKind::Influencer
            | ProfileKind::GroupAdmin => Self::AffiliateRecruitment,
        }
    }
}

/// A referrer -> referee edge. At most one per referee and scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    pub referee_id: ProfileId,
    pub referrer_id: ProfileId,
    pub scheme: ReferralScheme,
    pub code_used: String,
    pub code_slot: CodeSlot,
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub attributed_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub attribution_expires_at: OffsetDateTime,
    /// Sum of commissions this edge generated for the referrer.
    pub total_commissions: Cents,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub first_threshold_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub second_threshold_at: Option<OffsetDateTime>,
    /// Whether the referrer earns N2 commissions through this branch.
    pub n2_unlocked: bool,
    /// Attribution was allowed but flagged for manual review.
    pub fraud_review: bool,
}

impl Referral {
    /// True once the referee crossed the first threshold.
    #[must_use]
    pub const fn is_qualified(&self) -> bool {
        self.first_threshold_at.is_some()
    }
}

/// One of the two recruitment thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdLevel {
    First,
    Second,
}

impl ThresholdLevel {
    #[must_use]
    pub const fn commission_type(&self) -> CommissionType {
        match self {
            Self::First => CommissionType::ThresholdFirst,
            Self::Second => CommissionType::ThresholdSecond,
        }
    }

    /// Source id of the one-time threshold commission.
    #[must_use]
    pub const fn source_id(&self) -> &'static str {
        match self {
            Self::First => "threshold:first",
            Self::Second => "threshold:second",
        }
    }

    /// Earnings needed to cross this threshold.
    #[must_use]
    pub const fn required(&self, settings: &ReferralProgramSettings) -> Cents {
        match self {
            Self::First => settings.first_threshold,
            Self::Second => settings.second_threshold,
        }
    }

    /// Bonus paid to the recruiter.
    #[must_use]
    pub const fn bonus(&self, settings: &ReferralProgramSettings) -> Cents {
        match self {
            Self::First => settings.first_threshold_bonus,
            Self::Second => settings.second_threshold_bonus,
        }
    }

    const fn is_marked(self, edge: &Referral) -> bool {
        match self {
            Self::First => edge.first_threshold_at.is_some(),
            Self::Second => edge.second_threshold_at.is_some(),
        }
    }
}

/// Thresholds the referee has crossed that are not yet marked on the edge.
///
/// The first threshold always precedes the second.
#[must_use]
pub fn pending_thresholds(
    edge: &Referral,
    referee_earnings: Cents,
    settings: &ReferralProgramSettings,
) -> Vec<ThresholdLevel> {
    [ThresholdLevel::First, ThresholdLevel::Second]
        .into_iter()
        .filter(|level| !level.is_marked(edge) && referee_earnings >= level.required(settings))
        .collect()
}

/// Tier bonuses reached by `qualified` recruits that were not yet paid.
#[must_use]
pub fn unpaid_milestones(
    qualified: u32,
    paid: &BTreeSet<u32>,
    tiers: &[TierBonus],
) -> Vec<TierBonus> {
    tiers
        .iter()
        .filter(|tier| tier.milestone <= qualified && !paid.contains(&tier.milestone))
        .copied()
        .collect()
}

/// Source id of a tier bonus commission.
#[must_use]
pub fn tier_source_id(milestone: u32) -> String {
    format!("tier:{milestone}")
}
