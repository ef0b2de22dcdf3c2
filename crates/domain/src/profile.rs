// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Profiles: the aggregate owning a referrer's balance and captured rates.

use crate::balance::{AffiliateStats, Balance};
use crate::config::CapturedRates;
use crate::error::DomainError;
use crate::ids::ProfileId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;

str_enum! {
    /// The role a profile plays on the marketplace.
    pub enum ProfileKind: "profile kind" {
        Client => "client",
        Provider => "provider",
        Chatter => "chatter",
        Blogger => "blogger",
        Influencer => "influencer",
        GroupAdmin => "group_admin",
    }
}

impl ProfileKind {
    /// True for roles enrolled in the affiliate program.
    ///
    /// These roles get the full set of referral codes and captured rates.
    #[must_use]
    pub const fn is_affiliate(&self) -> bool {
        matches!(
            self,
            Self::Chatter | Self::Blogger | Self::Influencer | Self::GroupAdmin
        )
    }

    /// Prefix used for generated referral codes.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Client => "CL",
            Self::Provider => "PV",
            Self::Chatter => "CH",
            Self::Blogger => "BL",
            Self::Influencer => "IN",
            Self::GroupAdmin => "GA",
        }
    }
}

str_enum! {
    /// Account standing.
    pub enum ProfileStatus: "profile status" {
        Active => "active",
        Suspended => "suspended",
        Banned => "banned",
    }
}

str_enum! {
    /// Fraud review standing.
    pub enum FraudStatus: "fraud status" {
        Clear => "clear",
        UnderReview => "under_review",
        Blocked => "blocked",
    }
}

str_enum! {
    /// Code slots, listed in lookup priority order.
    pub enum CodeSlot: "code slot" {
        /// The profile's main code.
        Generic => "generic",
        /// Variant shared with prospective clients.
        ClientVariant => "client_variant",
        /// Variant shared with prospective providers.
        ProviderVariant => "provider_variant",
        /// Variant used to recruit other affiliates.
        Recruitment => "recruitment",
    }
}

impl CodeSlot {
    /// Slots in the order a code lookup tries them.
    pub const PRIORITY: [Self; 4] = [
        Self::Generic,
        Self::ClientVariant,
        Self::ProviderVariant,
        Self::Recruitment,
    ];

    const fn code_suffix(self) -> &'static str {
        match self {
            Self::Generic => "",
            Self::ClientVariant => "C",
            Self::ProviderVariant => "P",
            Self::Recruitment => "R",
        }
    }
}

/// A referral code held in one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralCode {
    pub slot: CodeSlot,
    /// Normalized (trimmed, uppercase) code.
    pub code: String,
}

/// Normalizes a user-entered code: trims whitespace and uppercases.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Generates the referral codes for a new profile.
///
/// Affiliates get every slot; clients and providers only get the generic code.
#[must_use]
pub fn generate_codes(kind: ProfileKind) -> Vec<ReferralCode> {
    let stem: String = format!("{}{:08X}", kind.code_prefix(), rand::random::<u32>());
    let slots: &[CodeSlot] = if kind.is_affiliate() {
        &CodeSlot::PRIORITY
    } else {
        &CodeSlot::PRIORITY[..1]
    };
    slots
        .iter()
        .map(|slot| ReferralCode {
            slot: *slot,
            code: format!("{stem}{}", slot.code_suffix()),
        })
        .collect()
}

/// Signals captured at signup, used by the fraud gate and self-referral check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupSignals {
    pub ip_address: Option<String>,
    pub device_fingerprint: Option<String>,
}

/// A cached payout recipient at the transfer provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecipient {
    pub recipient_id: String,
    /// Fingerprint of the payment details the recipient was created from.
    pub details_fingerprint: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A marketplace profile with its embedded ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateProfile {
    pub id: ProfileId,
    pub kind: ProfileKind,
    pub status: ProfileStatus,
    pub email: String,
    pub email_verified: bool,
    pub display_name: String,
    pub codes: Vec<ReferralCode>,
    pub captured_rates: Option<CapturedRates>,
    pub balance: Balance,
    pub stats: AffiliateStats,
    /// The affiliate that recruited this profile, for N1/N2 chains.
    pub referred_by: Option<ProfileId>,
    /// Tier milestones already paid.
    #[serde(default)]
    pub paid_tier_milestones: BTreeSet<u32>,
    pub signup: SignupSignals,
    pub payout_recipient: Option<PayoutRecipient>,
    pub fraud_status: FraudStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl AffiliateProfile {
    /// Returns the code held in a slot, if any.
    #[must_use]
    pub fn code(&self, slot: CodeSlot) -> Option<&str> {
        self.codes
            .iter()
            .find(|c| c.slot == slot)
            .map(|c| c.code.as_str())
    }

    /// True if the profile may earn commissions.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ProfileStatus::Active
    }
}

/// Validates an email address shape.
///
/// # Errors
///
/// Returns `DomainError::InvalidEmail` if the email is empty or lacks a domain.
pub fn validate_email(email: &str) -> Result<(), DomainError> {
    let trimmed: &str = email.trim();
    if trimmed.is_empty() {
        return Err(DomainError::InvalidEmail(String::from(
            "email cannot be empty",
        )));
    }
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(DomainError::InvalidEmail(format!(
            "'{trimmed}' is not a valid address"
        ))),
    }
}

/// Validates a display name.
///
/// # Errors
///
/// Returns `DomainError::InvalidDisplayName` if the name is blank or too long.
pub fn validate_display_name(name: &str) -> Result<(), DomainError> {
    let trimmed: &str = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::InvalidDisplayName(String::from(
            "display name cannot be empty",
        )));
    }
    if trimmed.chars().count() > 120 {
        return Err(DomainError::InvalidDisplayName(String::from(
            "display name cannot exceed 120 characters",
        )));
    }
    Ok(())
}
