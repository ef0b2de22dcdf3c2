// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Callable operations.
//!
//! Every handler authorizes the actor and validates its request before any
//! side effect, then translates engine errors into `ApiError`s.

use affilink::{
    AffiliateEngine, LedgerStore, PayoutOrchestrator, ReconcileReport, TierScanReport,
    TransferProvider,
};
use affilink_domain::{
    AffiliateConfig, Balance, Cents, Commission, CommissionId, CommissionStatus, PaymentDetails,
    ProfileId, Withdrawal, WithdrawalId,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{AuthenticatedActor, AuthorizationService};
use crate::error::{ApiError, translate_core_error};
use crate::request_response::{
    AdjustCommissionRequest, BalanceResponse, CancelCommissionRequest, CommissionActionResponse,
    CommissionSummary, ConfigResponse, GetBalanceRequest, ListCommissionsRequest,
    ListCommissionsResponse, ReconciliationResponse, RequestWithdrawalRequest,
    UpdateConfigRequest, WithdrawalActionRequest, WithdrawalDecisionRequest, WithdrawalResponse,
};

/// Default page size for commission listings.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Largest page size a caller may ask for.
pub const MAX_LIST_LIMIT: usize = 200;

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let trimmed: &str = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid(field, "must not be empty"));
    }
    Ok(trimmed)
}

fn positive(field: &str, value: Cents) -> Result<Cents, ApiError> {
    if value <= 0 {
        return Err(ApiError::invalid(field, "must be greater than zero"));
    }
    Ok(value)
}

/// Returns a profile's balance.
///
/// # Arguments
///
/// * `engine` - The affiliate engine
/// * `actor` - The authenticated actor; affiliates may only read their own
/// * `request` - The profile to read
///
/// # Errors
///
/// Returns an error if the actor may not read the profile, the id is empty
/// or the profile does not exist.
pub fn get_balance<S: LedgerStore>(
    engine: &AffiliateEngine<S>,
    actor: &AuthenticatedActor,
    request: &GetBalanceRequest,
) -> Result<BalanceResponse, ApiError> {
    let profile_id: ProfileId = ProfileId::new(required("profile_id", &request.profile_id)?);
    AuthorizationService::authorize_profile_read(actor, &profile_id, "get_balance")?;

    let balance: Balance = engine
        .ledger()
        .balance_of(&profile_id)
        .map_err(translate_core_error)?;
    Ok(BalanceResponse::new(profile_id.as_str(), &balance))
}

/// Lists a profile's commissions, newest first.
///
/// # Errors
///
/// Returns an error if the actor may not read the profile, the status
/// filter is unknown or the limit is out of range.
pub fn list_commissions<S: LedgerStore>(
    engine: &AffiliateEngine<S>,
    actor: &AuthenticatedActor,
    request: &ListCommissionsRequest,
) -> Result<ListCommissionsResponse, ApiError> {
    let profile_id: ProfileId = ProfileId::new(required("profile_id", &request.profile_id)?);
    AuthorizationService::authorize_profile_read(actor, &profile_id, "list_commissions")?;

    let status: Option<CommissionStatus> = match request.status.as_deref() {
        Some(raw) => Some(
            raw.trim()
                .parse()
                .map_err(|_| ApiError::invalid("status", &format!("unknown status '{raw}'")))?,
        ),
        None => None,
    };
    let limit: usize = request.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(ApiError::invalid(
            "limit",
            &format!("must be between 1 and {MAX_LIST_LIMIT}"),
        ));
    }

    // Unknown profiles are reported rather than listed as empty.
    engine
        .ledger()
        .balance_of(&profile_id)
        .map_err(translate_core_error)?;
    let mut commissions: Vec<Commission> = engine
        .ledger()
        .commissions_for(&profile_id)
        .map_err(translate_core_error)?;
    commissions.retain(|c| status.is_none_or(|wanted| c.status == wanted));
    commissions.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });

    let total: usize = commissions.len();
    Ok(ListCommissionsResponse {
        profile_id: profile_id.as_str().to_string(),
        commissions: commissions
            .iter()
            .take(limit)
            .map(CommissionSummary::from)
            .collect(),
        total,
    })
}

/// Requests a withdrawal of available earnings.
///
/// Only the profile owner may request a withdrawal.
///
/// # Errors
///
/// Returns an error if the actor is not the owner, the input is invalid, or
/// the withdrawal cannot be created (active withdrawal, minimum, monthly
/// limit, blocked account).
pub fn request_withdrawal<S: LedgerStore, P: TransferProvider>(
    payouts: &PayoutOrchestrator<S, P>,
    actor: &AuthenticatedActor,
    request: &RequestWithdrawalRequest,
) -> Result<WithdrawalResponse, ApiError> {
    let profile_id: ProfileId = ProfileId::new(required("profile_id", &request.profile_id)?);
    AuthorizationService::authorize_owner(actor, &profile_id, "request_withdrawal")?;
    let amount: Cents = positive("amount", request.amount)?;
    let payment: PaymentDetails = PaymentDetails {
        account_holder: required("account_holder", &request.account_holder)?.to_string(),
        iban: required("iban", &request.iban)?.to_string(),
        bic: request
            .bic
            .as_deref()
            .map(str::trim)
            .filter(|bic| !bic.is_empty())
            .map(str::to_string),
        country: required("country", &request.country)?.to_uppercase(),
        currency: required("currency", &request.currency)?.to_uppercase(),
    };

    let withdrawal: Withdrawal = payouts
        .request_withdrawal(&profile_id, amount, &payment)
        .map_err(translate_core_error)?;
    info!(
        withdrawal_id = %withdrawal.id,
        profile_id = %profile_id,
        amount = withdrawal.amount,
        "Withdrawal requested"
    );
    let message: String = if withdrawal.amount < amount {
        format!(
            "Withdrawal of {} created; {} was requested but only {} could be reserved",
            withdrawal.amount, amount, withdrawal.amount
        )
    } else {
        format!("Withdrawal of {} created", withdrawal.amount)
    };
    Ok(WithdrawalResponse::new(&withdrawal, message))
}

/// Cancels a commission that has not been paid.
///
/// # Errors
///
/// Returns an error if the actor is not an admin, the input is invalid, or
/// the commission cannot be cancelled.
pub fn cancel_commission<S: LedgerStore>(
    engine: &AffiliateEngine<S>,
    actor: &AuthenticatedActor,
    request: &CancelCommissionRequest,
) -> Result<CommissionActionResponse, ApiError> {
    AuthorizationService::authorize_admin(actor, "cancel_commission")?;
    let id: CommissionId = CommissionId::new(required("commission_id", &request.commission_id)?);
    let reason: &str = required("reason", &request.reason)?;

    let commission: Commission = engine
        .ledger()
        .cancel_commission(&id, &actor.to_audit_actor(), reason)
        .map_err(translate_core_error)?;
    Ok(CommissionActionResponse {
        commission: CommissionSummary::from(&commission),
        message: format!("Commission {id} cancelled"),
    })
}

/// Changes the amount of a commission that has not been paid.
///
/// # Errors
///
/// Returns an error if the actor is not an admin, the input is invalid, or
/// the commission cannot be adjusted.
pub fn adjust_commission<S: LedgerStore>(
    engine: &AffiliateEngine<S>,
    actor: &AuthenticatedActor,
    request: &AdjustCommissionRequest,
) -> Result<CommissionActionResponse, ApiError> {
    AuthorizationService::authorize_admin(actor, "adjust_commission")?;
    let id: CommissionId = CommissionId::new(required("commission_id", &request.commission_id)?);
    let new_amount: Cents = positive("new_amount", request.new_amount)?;
    let reason: &str = required("reason", &request.reason)?;

    let commission: Commission = engine
        .ledger()
        .adjust_commission_amount(&id, new_amount, &actor.to_audit_actor(), reason)
        .map_err(translate_core_error)?;
    Ok(CommissionActionResponse {
        commission: CommissionSummary::from(&commission),
        message: format!("Commission {id} adjusted to {new_amount}"),
    })
}

/// Approves a pending withdrawal.
///
/// # Errors
///
/// Returns an error if the actor is not an admin or the withdrawal is not
/// pending.
pub fn approve_withdrawal<S: LedgerStore, P: TransferProvider>(
    payouts: &PayoutOrchestrator<S, P>,
    actor: &AuthenticatedActor,
    request: &WithdrawalActionRequest,
) -> Result<WithdrawalResponse, ApiError> {
    AuthorizationService::authorize_admin(actor, "approve_withdrawal")?;
    let id: WithdrawalId = WithdrawalId::new(required("withdrawal_id", &request.withdrawal_id)?);

    let withdrawal: Withdrawal = payouts
        .approve_withdrawal(&id, &actor.to_audit_actor())
        .map_err(translate_core_error)?;
    Ok(WithdrawalResponse::new(
        &withdrawal,
        format!("Withdrawal {id} approved"),
    ))
}

/// Rejects a pending or approved withdrawal and returns its funds.
///
/// # Errors
///
/// Returns an error if the actor is not an admin, the reason is missing, or
/// the withdrawal can no longer be rejected.
pub fn reject_withdrawal<S: LedgerStore, P: TransferProvider>(
    payouts: &PayoutOrchestrator<S, P>,
    actor: &AuthenticatedActor,
    request: &WithdrawalDecisionRequest,
) -> Result<WithdrawalResponse, ApiError> {
    AuthorizationService::authorize_admin(actor, "reject_withdrawal")?;
    let id: WithdrawalId = WithdrawalId::new(required("withdrawal_id", &request.withdrawal_id)?);
    let reason: &str = required("reason", &request.reason)?;

    let withdrawal: Withdrawal = payouts
        .reject_withdrawal(&id, &actor.to_audit_actor(), reason)
        .map_err(translate_core_error)?;
    Ok(WithdrawalResponse::new(
        &withdrawal,
        format!("Withdrawal {id} rejected"),
    ))
}

/// Runs the transfer saga for an approved withdrawal.
///
/// A failed transfer is not an error here: the returned withdrawal carries
/// the `failed` status and failure kind.
///
/// # Errors
///
/// Returns an error if the actor is not an admin or the withdrawal is not
/// approved.
pub async fn process_withdrawal<S: LedgerStore, P: TransferProvider>(
    payouts: &PayoutOrchestrator<S, P>,
    actor: &AuthenticatedActor,
    request: &WithdrawalActionRequest,
) -> Result<WithdrawalResponse, ApiError> {
    AuthorizationService::authorize_admin(actor, "process_withdrawal")?;
    let id: WithdrawalId = WithdrawalId::new(required("withdrawal_id", &request.withdrawal_id)?);

    let withdrawal: Withdrawal = payouts
        .process_withdrawal(&id)
        .await
        .map_err(translate_core_error)?;
    let message: String = match &withdrawal.failure {
        Some(failure) => {
            warn!(withdrawal_id = %id, step = %failure.step, kind = %failure.kind, "Payout failed");
            format!("Withdrawal {id} failed; funds remain reserved until released")
        }
        None => format!("Withdrawal {id} is {}", withdrawal.status),
    };
    Ok(WithdrawalResponse::new(&withdrawal, message))
}

/// Returns the funds of a failed withdrawal to the available balance.
///
/// # Errors
///
/// Returns an error if the actor is not an admin, the reason is missing, or
/// the withdrawal is not failed or was already released.
pub fn release_failed_withdrawal<S: LedgerStore, P: TransferProvider>(
    payouts: &PayoutOrchestrator<S, P>,
    actor: &AuthenticatedActor,
    request: &WithdrawalDecisionRequest,
) -> Result<WithdrawalResponse, ApiError> {
    AuthorizationService::authorize_admin(actor, "release_failed_withdrawal")?;
    let id: WithdrawalId = WithdrawalId::new(required("withdrawal_id", &request.withdrawal_id)?);
    let reason: &str = required("reason", &request.reason)?;

    let withdrawal: Withdrawal = payouts
        .release_failed_withdrawal(&id, &actor.to_audit_actor(), reason)
        .map_err(translate_core_error)?;
    Ok(WithdrawalResponse::new(
        &withdrawal,
        format!("Funds of withdrawal {id} released"),
    ))
}

/// Applies a partial configuration update.
///
/// # Errors
///
/// Returns an error if the actor is not an admin, the reason is missing, or
/// the resulting configuration is invalid.
pub fn update_config<S: LedgerStore>(
    engine: &AffiliateEngine<S>,
    actor: &AuthenticatedActor,
    request: &UpdateConfigRequest,
) -> Result<ConfigResponse, ApiError> {
    AuthorizationService::authorize_admin(actor, "update_config")?;
    let reason: &str = required("reason", &request.reason)?;
    if request.update.is_empty() {
        return Err(ApiError::invalid("update", "no fields to change"));
    }

    let config: AffiliateConfig = engine
        .context()
        .config
        .update_config(&request.update, &actor.to_audit_actor(), reason)
        .map_err(translate_core_error)?;
    Ok(ConfigResponse {
        version: config.version,
        config,
    })
}

/// Returns the current configuration.
///
/// # Errors
///
/// Returns an error if the actor is not an admin or the configuration
/// cannot be loaded.
pub fn get_config<S: LedgerStore>(
    engine: &AffiliateEngine<S>,
    actor: &AuthenticatedActor,
) -> Result<ConfigResponse, ApiError> {
    AuthorizationService::authorize_admin(actor, "get_config")?;
    let config: Arc<AffiliateConfig> = engine
        .context()
        .config
        .get_config()
        .map_err(translate_core_error)?;
    Ok(ConfigResponse {
        version: config.version,
        config: AffiliateConfig::clone(&config),
    })
}

/// Runs the validate pass, release pass and tier scan immediately.
///
/// # Errors
///
/// Returns an error if the actor is not an admin or a pass cannot query its
/// due work. Per-item failures are counted in the response.
pub fn run_reconciliation<S: LedgerStore>(
    engine: &AffiliateEngine<S>,
    actor: &AuthenticatedActor,
) -> Result<ReconciliationResponse, ApiError> {
    AuthorizationService::authorize_admin(actor, "run_reconciliation")?;

    let validated: ReconcileReport = engine
        .reconciler()
        .validate_pass()
        .map_err(translate_core_error)?;
    let released: ReconcileReport = engine
        .reconciler()
        .release_pass()
        .map_err(translate_core_error)?;
    let tiers: TierScanReport = engine.graph().tier_scan().map_err(translate_core_error)?;
    info!(
        actor = %actor.id,
        validated = validated.advanced,
        released = released.advanced,
        tier_bonuses = tiers.paid,
        "Manual reconciliation finished"
    );
    Ok(ReconciliationResponse {
        validated: validated.into(),
        released: released.into(),
        tier_bonuses_paid: tiers.paid,
    })
}
