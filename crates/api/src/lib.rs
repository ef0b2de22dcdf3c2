// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Boundary layer for the callable affiliate operations.
//!
//! Transport is out of scope: a caller resolves its session into a
//! [`CallerIdentity`], authenticates it into an [`AuthenticatedActor`] and
//! invokes the handlers. Errors come back as [`ApiError`] with a stable
//! [`ApiError::code`] and a message that is safe to show.

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

mod auth;
mod error;
mod handlers;
mod request_response;

#[cfg(test)]
mod tests;

pub use auth::{AuthenticatedActor, AuthorizationService, CallerIdentity, Role};
pub use error::{ApiError, AuthError, translate_core_error, translate_domain_error};
pub use handlers::{
    DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT, adjust_commission, approve_withdrawal, cancel_commission,
    get_balance, get_config, list_commissions, process_withdrawal, reject_withdrawal,
    release_failed_withdrawal, request_withdrawal, run_reconciliation, update_config,
};
pub use request_response::{
    AdjustCommissionRequest, BalanceResponse, CancelCommissionRequest, CommissionActionResponse,
    CommissionSummary, ConfigResponse, GetBalanceRequest, ListCommissionsRequest,
    ListCommissionsResponse, PassSummary, ReconciliationResponse, RequestWithdrawalRequest,
    UpdateConfigRequest, WithdrawalActionRequest, WithdrawalDecisionRequest, WithdrawalResponse,
};
