// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Rule condition evaluation.
//!
//! A failed condition is an expected business outcome, not an error: the
//! evaluator returns the reason so the caller can report "not created".

use crate::config::RuleConditions;
use serde::{Deserialize, Serialize};

/// Facts about the triggering event that rule conditions inspect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationContext {
    /// Overrides the referee profile's verification flag when present.
    pub email_verified: Option<bool>,
    pub call_duration_secs: Option<u32>,
    pub provider_type: Option<String>,
    /// 1-based month of the subscription this event pays for.
    pub subscription_month: Option<u32>,
}

/// Existing non-cancelled commissions counted against rule caps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionUsage {
    /// Same type, same referrer, current calendar month.
    pub this_month: u32,
    /// Same type, same referrer and referee, ever.
    pub lifetime: u32,
}

/// Evaluates rule conditions.
///
/// # Arguments
///
/// * `conditions` - The rule's conditions
/// * `context` - Facts about the event
/// * `referee_email_verified` - The referee profile's verification flag
/// * `usage` - Commissions already counted against the caps
///
/// # Errors
///
/// Returns the reason of the first failed condition.
pub fn evaluate_conditions(
    conditions: &RuleConditions,
    context: &EvaluationContext,
    referee_email_verified: bool,
    usage: ConditionUsage,
) -> Result<(), String> {
    if conditions.require_email_verification
        && !context.email_verified.unwrap_or(referee_email_verified)
    {
        return Err(String::from("referee email is not verified"));
    }

    if let Some(minimum) = conditions.min_call_duration_secs {
        match context.call_duration_secs {
            Some(duration) if duration >= minimum => {}
            Some(duration) => {
                return Err(format!(
                    "call duration {duration}s is below the {minimum}s minimum"
                ));
            }
            None => return Err(String::from("call duration is unknown")),
        }
    }

    if let Some(allowed) = &conditions.allowed_provider_types {
        match &context.provider_type {
            Some(provider_type) if allowed.iter().any(|a| a == provider_type) => {}
            Some(provider_type) => {
                return Err(format!("provider type '{provider_type}' is not eligible"));
            }
            None => return Err(String::from("provider type is unknown")),
        }
    }

    if let Some(cap) = conditions.max_per_month
        && usage.this_month >= cap
    {
        return Err(format!("monthly limit of {cap} reached"));
    }

    if let Some(cap) = conditions.lifetime_limit
        && usage.lifetime >= cap
    {
        return Err(format!("lifetime limit of {cap} reached"));
    }

    if let Some(max_months) = conditions.max_months {
        match context.subscription_month {
            Some(month) if month <= max_months => {}
            Some(month) => {
                return Err(format!(
                    "subscription month {month} is past the {max_months} month limit"
                ));
            }
            None => return Err(String::from("subscription month is unknown")),
        }
    }

    Ok(())
}
