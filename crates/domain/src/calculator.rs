// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Commission amount calculation.
//!
//! This module is pure: given a rule, the base amounts of an event and the
//! referrer's captured rates it returns the amount together with the
//! metadata that is stored on the commission for audit.

use crate::commission::{CalculationDetails, CommissionType};
use crate::config::{ApplyTo, CalculationType, CapturedRates, CommissionRule};
use crate::money::{Cents, Rate, format_amount};
use serde::{Deserialize, Serialize};

/// Base amounts carried by an event. Any of them may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseAmounts {
    pub connection_fee: Option<Cents>,
    pub total_amount: Option<Cents>,
    pub first_month: Option<Cents>,
    pub annual_value: Option<Cents>,
}

impl BaseAmounts {
    /// Selects the base amount named by `apply_to`.
    ///
    /// Without a selector a positive total amount is used, falling back to
    /// the connection fee.
    #[must_use]
    pub fn select(&self, apply_to: Option<ApplyTo>) -> Option<Cents> {
        match apply_to {
            Some(ApplyTo::ConnectionFee) => self.connection_fee,
            Some(ApplyTo::TotalAmount) => self.total_amount,
            Some(ApplyTo::FirstMonth) => self.first_month,
            Some(ApplyTo::AnnualValue) => self.annual_value,
            None => self
                .total_amount
                .filter(|amount| *amount > 0)
                .or(self.connection_fee),
        }
    }
}

/// Why a calculation produced no amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalculationError {
    /// The rule is switched off.
    RuleDisabled,
    /// The selected base amount is missing, zero or negative.
    NonPositiveBase {
        /// The base that was selected, if any.
        base: Option<Cents>,
    },
    /// The amount does not fit in minor units.
    Overflow,
}

impl std::fmt::Display for CalculationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RuleDisabled => write!(f, "Commission rule is disabled"),
            Self::NonPositiveBase { base: Some(base) } => {
                write!(f, "Base amount {base} must be positive")
            }
            Self::NonPositiveBase { base: None } => write!(f, "Base amount is missing"),
            Self::Overflow => write!(f, "Commission amount overflowed"),
        }
    }
}

impl std::error::Error for CalculationError {}

/// The result of a successful calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculatedAmount {
    pub amount: Cents,
    pub details: CalculationDetails,
}

/// Computes the commission amount for an event.
///
/// Captured rates take precedence over the rule's own amounts for the
/// commission types the rate card covers.
///
/// # Arguments
///
/// * `rule` - The rule to apply
/// * `commission_type` - The commission type being priced
/// * `bases` - The event's base amounts
/// * `captured` - The referrer's captured rates, if any
/// * `currency` - Currency used in the breakdown text
///
/// # Errors
///
/// Returns a `CalculationError` if the rule is disabled, the base is not
/// positive for percentage rules, or the amount overflows.
pub fn calculate(
    rule: &CommissionRule,
    commission_type: CommissionType,
    bases: &BaseAmounts,
    captured: Option<&CapturedRates>,
    currency: &str,
) -> Result<CalculatedAmount, CalculationError> {
    if !rule.enabled {
        return Err(CalculationError::RuleDisabled);
    }

    let captured_fixed: Option<Cents> = captured.and_then(|c| c.rates.fixed_for(commission_type));
    let captured_rate: Option<Rate> = captured.and_then(|c| c.rates.rate_for(commission_type));
    let fixed: Cents = captured_fixed.unwrap_or(rule.fixed_amount);
    let rate: Rate = captured_rate.unwrap_or(rule.percentage_rate);

    match rule.calculation_type {
        CalculationType::Fixed => Ok(CalculatedAmount {
            amount: fixed,
            details: CalculationDetails {
                calculation_type: CalculationType::Fixed,
                base_amount: None,
                rate_applied: None,
                fixed_component: Some(fixed),
                used_captured_rates: captured_fixed.is_some(),
                breakdown: format!("fixed {}", format_amount(fixed, currency)),
            },
        }),
        CalculationType::Percentage => {
            let base: Cents = positive_base(bases, rule.apply_to)?;
            let amount: Cents = rate.apply(base).map_err(|_| CalculationError::Overflow)?;
            Ok(CalculatedAmount {
                amount,
                details: CalculationDetails {
                    calculation_type: CalculationType::Percentage,
                    base_amount: Some(base),
                    rate_applied: Some(rate),
                    fixed_component: None,
                    used_captured_rates: captured_rate.is_some(),
                    breakdown: format!(
                        "{rate} of {} = {}",
                        format_amount(base, currency),
                        format_amount(amount, currency)
                    ),
                },
            })
        }
        CalculationType::Hybrid => {
            let base: Cents = positive_base(bases, rule.apply_to)?;
            let variable: Cents = rate.apply(base).map_err(|_| CalculationError::Overflow)?;
            let amount: Cents = fixed
                .checked_add(variable)
                .ok_or(CalculationError::Overflow)?;
            Ok(CalculatedAmount {
                amount,
                details: CalculationDetails {
                    calculation_type: CalculationType::Hybrid,
                    base_amount: Some(base),
                    rate_applied: Some(rate),
                    fixed_component: Some(fixed),
                    used_captured_rates: captured_fixed.is_some() || captured_rate.is_some(),
                    breakdown: format!(
                        "{} + {rate} of {} = {}",
                        format_amount(fixed, currency),
                        format_amount(base, currency),
                        format_amount(amount, currency)
                    ),
                },
            })
        }
    }
}

fn positive_base(bases: &BaseAmounts, apply_to: Option<ApplyTo>) -> Result<Cents, CalculationError> {
    match bases.select(apply_to) {
        Some(base) if base > 0 => Ok(base),
        other => Err(CalculationError::NonPositiveBase { base: other }),
    }
}
