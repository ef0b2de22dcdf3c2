// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! API request and response data transfer objects.

use affilink::ReconcileReport;
use affilink_domain::{AffiliateConfig, Balance, Commission, ConfigUpdate, Withdrawal};
use time::OffsetDateTime;

/// API request to read a balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBalanceRequest {
    pub profile_id: String,
}

/// API response carrying a profile's balance buckets.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BalanceResponse {
    pub profile_id: String,
    pub pending: i64,
    pub validated: i64,
    pub available: i64,
    pub total_earned: i64,
    pub total_withdrawn: i64,
}

impl BalanceResponse {
    #[must_use]
    pub fn new(profile_id: &str, balance: &Balance) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            pending: balance.pending,
            validated: balance.validated,
            available: balance.available,
            total_earned: balance.total_earned,
            total_withdrawn: balance.total_withdrawn,
        }
    }
}

/// API request to list a profile's commissions, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCommissionsRequest {
    pub profile_id: String,
    /// Optional status filter (`pending`, `validated`, `available`, `paid`,
    /// `cancelled`).
    pub status: Option<String>,
    /// Page size, 1 to 200. Defaults to 50.
    pub limit: Option<usize>,
}

/// A commission as shown to its earner.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommissionSummary {
    pub commission_id: String,
    pub commission_type: String,
    pub referee_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub available_at: OffsetDateTime,
}

impl From<&Commission> for CommissionSummary {
    fn from(commission: &Commission) -> Self {
        Self {
            commission_id: commission.id.as_str().to_string(),
            commission_type: commission.commission_type.as_str().to_string(),
            referee_id: commission.referee_id.as_str().to_string(),
            amount: commission.amount,
            currency: commission.currency.clone(),
            status: commission.status.as_str().to_string(),
            description: commission.description.clone(),
            created_at: commission.created_at,
            available_at: commission.available_at,
        }
    }
}

/// API response for a commission listing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ListCommissionsResponse {
    pub profile_id: String,
    pub commissions: Vec<CommissionSummary>,
    /// Number of matching commissions before the limit was applied.
    pub total: usize,
}

/// API request to withdraw available earnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestWithdrawalRequest {
    pub profile_id: String,
    /// Requested amount in minor units.
    pub amount: i64,
    pub account_holder: String,
    pub iban: String,
    pub bic: Option<String>,
    pub country: String,
    pub currency: String,
}

/// A withdrawal as returned to callers.
///
/// Provider messages are not included; only the failure kind is.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WithdrawalResponse {
    pub withdrawal_id: String,
    pub profile_id: String,
    pub status: String,
    pub requested_amount: i64,
    pub amount: i64,
    pub currency: String,
    pub commission_count: usize,
    pub requires_review: bool,
    pub failure_kind: Option<String>,
    pub funds_released: bool,
    pub message: String,
}

impl WithdrawalResponse {
    #[must_use]
    pub fn new(withdrawal: &Withdrawal, message: String) -> Self {
        Self {
            withdrawal_id: withdrawal.id.as_str().to_string(),
            profile_id: withdrawal.referrer_id.as_str().to_string(),
            status: withdrawal.status.as_str().to_string(),
            requested_amount: withdrawal.requested_amount,
            amount: withdrawal.amount,
            currency: withdrawal.currency.clone(),
            commission_count: withdrawal.commission_ids.len(),
            requires_review: withdrawal.requires_review,
            failure_kind: withdrawal
                .failure
                .as_ref()
                .map(|failure| failure.kind.as_str().to_string()),
            funds_released: withdrawal.funds_released_at.is_some(),
            message,
        }
    }
}

/// API request identifying a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalActionRequest {
    pub withdrawal_id: String,
}

/// API request for withdrawal actions that need a reason (reject, release).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalDecisionRequest {
    pub withdrawal_id: String,
    pub reason: String,
}

/// API request to cancel a commission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelCommissionRequest {
    pub commission_id: String,
    pub reason: String,
}

/// API request to change the amount of an unpaid commission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustCommissionRequest {
    pub commission_id: String,
    /// The new amount in minor units.
    pub new_amount: i64,
    pub reason: String,
}

/// API response for commission corrections.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommissionActionResponse {
    pub commission: CommissionSummary,
    pub message: String,
}

/// API request to update the affiliate configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateConfigRequest {
    pub update: ConfigUpdate,
    pub reason: String,
}

/// API response carrying the current configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConfigResponse {
    pub version: u64,
    pub config: AffiliateConfig,
}

/// Counters of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PassSummary {
    pub scanned: usize,
    pub advanced: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl From<ReconcileReport> for PassSummary {
    fn from(report: ReconcileReport) -> Self {
        Self {
            scanned: report.scanned,
            advanced: report.advanced,
            skipped: report.skipped,
            failed: report.failed,
        }
    }
}

/// API response for a manual reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReconciliationResponse {
    pub validated: PassSummary,
    pub released: PassSummary,
    /// Tier bonuses paid by the tier scan.
    pub tier_bonuses_paid: usize,
}
