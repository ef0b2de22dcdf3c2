// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The versioned affiliate program configuration.
//!
//! Every update bumps `version` and appends one entry to `rate_history`.
//! Updates are validated as a whole before any field is replaced.

use crate::commission::CommissionType;
use crate::error::DomainError;
use crate::money::{Cents, Rate, validate_currency};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// How a rule computes an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationType {
    Fixed,
    Percentage,
    Hybrid,
}

/// Which base amount a percentage applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyTo {
    ConnectionFee,
    TotalAmount,
    FirstMonth,
    AnnualValue,
}

/// Conditions evaluated against the event context before a commission is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConditions {
    /// Referee must have verified their email.
    pub require_email_verification: bool,
    /// Minimum call duration in seconds.
    pub min_call_duration_secs: Option<u32>,
    /// Allowed provider types. `None` allows any.
    pub allowed_provider_types: Option<Vec<String>>,
    /// Maximum commissions of this type per referrer per calendar month.
    pub max_per_month: Option<u32>,
    /// Maximum commissions of this type per referrer and referee, ever.
    pub lifetime_limit: Option<u32>,
    /// Last subscription month that still earns a commission.
    pub max_months: Option<u32>,
}

/// A commission rule for one commission type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRule {
    pub enabled: bool,
    pub calculation_type: CalculationType,
    pub fixed_amount: Cents,
    pub percentage_rate: Rate,
    pub apply_to: Option<ApplyTo>,
    #[serde(default)]
    pub conditions: RuleConditions,
}

impl CommissionRule {
    /// An enabled fixed-amount rule without conditions.
    #[must_use]
    pub fn fixed(amount: Cents) -> Self {
        Self {
            enabled: true,
            calculation_type: CalculationType::Fixed,
            fixed_amount: amount,
            percentage_rate: Rate::ZERO,
            apply_to: None,
            conditions: RuleConditions::default(),
        }
    }

    /// An enabled percentage rule without conditions.
    #[must_use]
    pub fn percentage(rate: Rate, apply_to: ApplyTo) -> Self {
        Self {
            enabled: true,
            calculation_type: CalculationType::Percentage,
            fixed_amount: 0,
            percentage_rate: rate,
            apply_to: Some(apply_to),
            conditions: RuleConditions::default(),
        }
    }

    /// Returns a copy of this rule with a different fixed amount.
    #[must_use]
    pub fn with_fixed_amount(&self, amount: Cents) -> Self {
        Self {
            fixed_amount: amount,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_conditions(mut self, conditions: RuleConditions) -> Self {
        self.conditions = conditions;
        self
    }

    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// The rates captured into a referrer's profile at enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCard {
    pub signup_bonus: Cents,
    pub call_fixed_bonus: Cents,
    pub recurring_call_bonus: Cents,
    pub subscription_rate: Rate,
    pub renewal_rate: Rate,
    pub provider_call_bonus: Cents,
    pub n1_call_amount: Cents,
    pub n2_call_amount: Cents,
}

impl Default for RateCard {
    fn default() -> Self {
        Self {
            signup_bonus: 200,
            call_fixed_bonus: 1_000,
            recurring_call_bonus: 500,
            subscription_rate: Rate::from_percent(10),
            renewal_rate: Rate::from_percent(5),
            provider_call_bonus: 500,
            n1_call_amount: 100,
            n2_call_amount: 50,
        }
    }
}

impl RateCard {
    /// The captured fixed amount for a commission type, if the card has one.
    #[must_use]
    pub const fn fixed_for(&self, commission_type: CommissionType) -> Option<Cents> {
        match commission_type {
            CommissionType::Signup => Some(self.signup_bonus),
            CommissionType::FirstCall => Some(self.call_fixed_bonus),
            CommissionType::RecurringCall => Some(self.recurring_call_bonus),
            CommissionType::ProviderCall => Some(self.provider_call_bonus),
            CommissionType::N1Call => Some(self.n1_call_amount),
            CommissionType::N2Call => Some(self.n2_call_amount),
            _ => None,
        }
    }

    /// The captured percentage for a commission type, if the card has one.
    #[must_use]
    pub const fn rate_for(&self, commission_type: CommissionType) -> Option<Rate> {
        match commission_type {
            CommissionType::Subscription => Some(self.subscription_rate),
            CommissionType::SubscriptionRenewal => Some(self.renewal_rate),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), DomainError> {
        let fixed: [(&str, Cents); 6] = [
            ("rates.signup_bonus", self.signup_bonus),
            ("rates.call_fixed_bonus", self.call_fixed_bonus),
            ("rates.recurring_call_bonus", self.recurring_call_bonus),
            ("rates.provider_call_bonus", self.provider_call_bonus),
            ("rates.n1_call_amount", self.n1_call_amount),
            ("rates.n2_call_amount", self.n2_call_amount),
        ];
        for (field, amount) in fixed {
            if amount < 0 {
                return Err(invalid(field, "amount cannot be negative"));
            }
        }
        for (field, rate) in [
            ("rates.subscription_rate", self.subscription_rate),
            ("rates.renewal_rate", self.renewal_rate),
        ] {
            if rate > Rate::from_percent(100) {
                return Err(invalid(field, "rate cannot exceed 100%"));
            }
        }
        Ok(())
    }
}

/// A referrer's frozen rate snapshot. Never rewritten once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedRates {
    pub rates: RateCard,
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    /// Config version the rates were captured from.
    pub config_version: u64,
}

/// Withdrawal limits and transfer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalSettings {
    pub minimum_amount: Cents,
    pub max_per_month: Option<u32>,
    pub max_amount_per_month: Option<Cents>,
    /// Upper bound for every transfer provider call.
    pub transfer_timeout_secs: u64,
    /// Processing withdrawals without a transfer after this long are failed.
    pub stale_processing_hours: u32,
}

impl Default for WithdrawalSettings {
    fn default() -> Self {
        Self {
            minimum_amount: 3_000,
            max_per_month: Some(3),
            max_amount_per_month: Some(500_000),
            transfer_timeout_secs: 30,
            stale_processing_hours: 48,
        }
    }
}

/// A milestone bonus for qualified recruits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBonus {
    /// Number of qualified recruits required.
    pub milestone: u32,
    pub amount: Cents,
}

/// Recruitment thresholds and tier bonuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralProgramSettings {
    /// Recruit's own client earnings needed for the first bonus.
    pub first_threshold: Cents,
    pub first_threshold_bonus: Cents,
    /// Recruit's own client earnings needed for the second bonus and N2 unlock.
    pub second_threshold: Cents,
    pub second_threshold_bonus: Cents,
    /// Milestones sorted ascending.
    pub tier_bonuses: Vec<TierBonus>,
}

impl Default for ReferralProgramSettings {
    fn default() -> Self {
        let tiers: [(u32, Cents); 6] = [
            (5, 1_500),
            (10, 3_500),
            (20, 7_500),
            (50, 25_000),
            (100, 60_000),
            (500, 400_000),
        ];
        Self {
            first_threshold: 2_000,
            first_threshold_bonus: 100,
            second_threshold: 5_000,
            second_threshold_bonus: 400,
            tier_bonuses: tiers
                .iter()
                .map(|(milestone, amount)| TierBonus {
                    milestone: *milestone,
                    amount: *amount,
                })
                .collect(),
        }
    }
}

/// Anti-fraud thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudSettings {
    pub enabled: bool,
    /// Scores at or above this block attribution.
    pub block_score: u8,
    /// Scores at or above this are flagged for review.
    pub review_score: u8,
    pub max_signups_per_ip_per_hour: u32,
    pub blocked_email_domains: Vec<String>,
    /// Minimum similarity (percent) for two emails to count as similar.
    pub email_similarity_percent: u8,
    /// Shared-signal severity at which a referral counts as self-referral.
    pub self_referral_severity: u8,
}

impl Default for FraudSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            block_score: 80,
            review_score: 50,
            max_signups_per_ip_per_hour: 3,
            blocked_email_domains: [
                "mailinator.com",
                "guerrillamail.com",
                "10minutemail.com",
                "tempmail.com",
                "yopmail.com",
                "trashmail.com",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            email_similarity_percent: 80,
            self_referral_severity: 60,
        }
    }
}

/// One append-only config history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateHistoryEntry {
    /// The version this change produced.
    pub version: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub changed_at: OffsetDateTime,
    pub changed_by: String,
    pub reason: String,
    pub changed_fields: Vec<String>,
    pub previous_rates: RateCard,
    pub new_rates: RateCard,
}

/// The affiliate program configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateConfig {
    pub version: u64,
    pub is_system_active: bool,
    pub default_currency: String,
    pub rules: BTreeMap<CommissionType, CommissionRule>,
    /// Rates captured by newly enrolled affiliates.
    pub rates: RateCard,
    pub hold_period_hours: u32,
    pub release_delay_hours: u32,
    pub attribution_window_days: u32,
    pub withdrawal: WithdrawalSettings,
    pub referral_program: ReferralProgramSettings,
    pub fraud: FraudSettings,
    #[serde(default)]
    pub rate_history: Vec<RateHistoryEntry>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub updated_at: Option<OffsetDateTime>,
    pub updated_by: Option<String>,
}

impl Default for AffiliateConfig {
    fn default() -> Self {
        let rates: RateCard = RateCard::default();
        let call_conditions: RuleConditions = RuleConditions {
            min_call_duration_secs: Some(120),
            ..RuleConditions::default()
        };
        let mut rules: BTreeMap<CommissionType, CommissionRule> = BTreeMap::new();
        rules.insert(
            CommissionType::Signup,
            CommissionRule::fixed(rates.signup_bonus)
                .with_conditions(RuleConditions {
                    require_email_verification: true,
                    ..RuleConditions::default()
                })
                .disabled(),
        );
        rules.insert(
            CommissionType::FirstCall,
            CommissionRule::fixed(rates.call_fixed_bonus).with_conditions(call_conditions.clone()),
        );
        rules.insert(
            CommissionType::RecurringCall,
            CommissionRule::fixed(rates.recurring_call_bonus)
                .with_conditions(call_conditions.clone()),
        );
        rules.insert(
            CommissionType::Subscription,
            CommissionRule::percentage(rates.subscription_rate, ApplyTo::FirstMonth),
        );
        rules.insert(
            CommissionType::SubscriptionRenewal,
            CommissionRule::percentage(rates.renewal_rate, ApplyTo::TotalAmount).with_conditions(
                RuleConditions {
                    max_months: Some(12),
                    ..RuleConditions::default()
                },
            ),
        );
        rules.insert(
            CommissionType::ProviderCall,
            CommissionRule::fixed(rates.provider_call_bonus).with_conditions(RuleConditions {
                min_call_duration_secs: Some(60),
                ..RuleConditions::default()
            }),
        );
        rules.insert(
            CommissionType::N1Call,
            CommissionRule::fixed(rates.n1_call_amount).with_conditions(call_conditions.clone()),
        );
        rules.insert(
            CommissionType::N2Call,
            CommissionRule::fixed(rates.n2_call_amount).with_conditions(call_conditions),
        );
        for bonus_type in [
            CommissionType::ThresholdFirst,
            CommissionType::ThresholdSecond,
            CommissionType::TierBonus,
            CommissionType::Manual,
        ] {
            rules.insert(bonus_type, CommissionRule::fixed(0));
        }

        Self {
            version: 1,
            is_system_active: true,
            default_currency: String::from("EUR"),
            rules,
            rates,
            hold_period_hours: 72,
            release_delay_hours: 24,
            attribution_window_days: 30,
            withdrawal: WithdrawalSettings::default(),
            referral_program: ReferralProgramSettings::default(),
            fraud: FraudSettings::default(),
            rate_history: Vec::new(),
            updated_at: None,
            updated_by: None,
        }
    }
}

/// A partial configuration update. `None` fields are left unchanged.
///
/// `rules` entries replace the rule for their commission type only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub is_system_active: Option<bool>,
    pub default_currency: Option<String>,
    pub rates: Option<RateCard>,
    pub rules: Option<BTreeMap<CommissionType, CommissionRule>>,
    pub hold_period_hours: Option<u32>,
    pub release_delay_hours: Option<u32>,
    pub attribution_window_days: Option<u32>,
    pub withdrawal: Option<WithdrawalSettings>,
    pub referral_program: Option<ReferralProgramSettings>,
    pub fraud: Option<FraudSettings>,
}

impl ConfigUpdate {
    /// Returns true if the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AffiliateConfig {
    /// Returns the configured rule for a commission type.
    #[must_use]
    pub fn rule(&self, commission_type: CommissionType) -> Option<&CommissionRule> {
        self.rules.get(&commission_type)
    }

    /// Applies a partial update, bumping the version and appending history.
    ///
    /// The config is left untouched if validation fails.
    ///
    /// # Arguments
    ///
    /// * `update` - The fields to change
    /// * `actor_id` - Who made the change
    /// * `reason` - Why the change was made
    /// * `now` - When the change was made
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfig` if the update is empty or the
    /// resulting config is invalid.
    pub fn apply_update(
        &mut self,
        update: ConfigUpdate,
        actor_id: &str,
        reason: &str,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        if update.is_empty() {
            return Err(invalid("update", "no fields to change"));
        }
        let mut next: Self = self.clone();
        let mut changed: Vec<String> = Vec::new();

        if let Some(value) = update.is_system_active {
            next.is_system_active = value;
            changed.push(String::from("is_system_active"));
        }
        if let Some(value) = update.default_currency {
            next.default_currency = value;
            changed.push(String::from("default_currency"));
        }
        if let Some(value) = update.rates {
            next.rates = value;
            changed.push(String::from("rates"));
        }
        if let Some(rules) = update.rules {
            for (commission_type, rule) in rules {
                changed.push(format!("rules.{}", commission_type.as_str()));
                next.rules.insert(commission_type, rule);
            }
        }
        if let Some(value) = update.hold_period_hours {
            next.hold_period_hours = value;
            changed.push(String::from("hold_period_hours"));
        }
        if let Some(value) = update.release_delay_hours {
            next.release_delay_hours = value;
            changed.push(String::from("release_delay_hours"));
        }
        if let Some(value) = update.attribution_window_days {
            next.attribution_window_days = value;
            changed.push(String::from("attribution_window_days"));
        }
        if let Some(value) = update.withdrawal {
            next.withdrawal = value;
            changed.push(String::from("withdrawal"));
        }
        if let Some(value) = update.referral_program {
            next.referral_program = value;
            changed.push(String::from("referral_program"));
        }
        if let Some(value) = update.fraud {
            next.fraud = value;
            changed.push(String::from("fraud"));
        }

        next.validate()?;

        next.version = self.version + 1;
        next.updated_at = Some(now);
        next.updated_by = Some(actor_id.to_string());
        next.rate_history.push(RateHistoryEntry {
            version: next.version,
            changed_at: now,
            changed_by: actor_id.to_string(),
            reason: reason.to_string(),
            changed_fields: changed,
            previous_rates: self.rates,
            new_rates: next.rates,
        });
        *self = next;
        Ok(())
    }

    /// Validates the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfig` naming the first invalid field.
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_currency(&self.default_currency)
            .map_err(|_| invalid("default_currency", "must be a three letter ISO code"))?;
        if self.attribution_window_days == 0 {
            return Err(invalid("attribution_window_days", "must be positive"));
        }
        self.rates.validate()?;
        for (commission_type, rule) in &self.rules {
            if rule.fixed_amount < 0 {
                return Err(invalid(
                    &format!("rules.{}.fixed_amount", commission_type.as_str()),
                    "amount cannot be negative",
                ));
            }
            if rule.percentage_rate > Rate::from_percent(100) {
                return Err(invalid(
                    &format!("rules.{}.percentage_rate", commission_type.as_str()),
                    "rate cannot exceed 100%",
                ));
            }
        }

        let withdrawal: &WithdrawalSettings = &self.withdrawal;
        if withdrawal.minimum_amount <= 0 {
            return Err(invalid("withdrawal.minimum_amount", "must be positive"));
        }
        if withdrawal.transfer_timeout_secs == 0 {
            return Err(invalid("withdrawal.transfer_timeout_secs", "must be positive"));
        }
        if withdrawal
            .max_amount_per_month
            .is_some_and(|cap| cap < withdrawal.minimum_amount)
        {
            return Err(invalid(
                "withdrawal.max_amount_per_month",
                "cannot be below the minimum withdrawal",
            ));
        }

        let program: &ReferralProgramSettings = &self.referral_program;
        if program.first_threshold <= 0 {
            return Err(invalid("referral_program.first_threshold", "must be positive"));
        }
        if program.second_threshold <= program.first_threshold {
            return Err(invalid(
                "referral_program.second_threshold",
                "must exceed the first threshold",
            ));
        }
        if program.first_threshold_bonus < 0 || program.second_threshold_bonus < 0 {
            return Err(invalid(
                "referral_program.threshold_bonus",
                "amount cannot be negative",
            ));
        }
        let mut previous: u32 = 0;
        for tier in &program.tier_bonuses {
            if tier.milestone <= previous {
                return Err(invalid(
                    "referral_program.tier_bonuses",
                    "milestones must be positive and strictly increasing",
                ));
            }
            if tier.amount < 0 {
                return Err(invalid(
                    "referral_program.tier_bonuses",
                    "amount cannot be negative",
                ));
            }
            previous = tier.milestone;
        }

        let fraud: &FraudSettings = &self.fraud;
        if fraud.block_score > 100 || fraud.review_score > fraud.block_score {
            return Err(invalid(
                "fraud.review_score",
                "must satisfy review <= block <= 100",
            ));
        }
        if fraud.email_similarity_percent > 100 || fraud.self_referral_severity > 100 {
            return Err(invalid("fraud", "percentages cannot exceed 100"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> DomainError {
    DomainError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
