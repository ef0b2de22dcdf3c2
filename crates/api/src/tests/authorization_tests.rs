// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use affilink::{CoreError, StoreError};
use affilink_domain::{DomainError, ProfileId};

use super::helpers::{
    Fixture, create_fixture, create_test_admin, create_test_affiliate, create_withdrawal_request,
};
use crate::{
    ApiError, AuthError, AuthenticatedActor, CallerIdentity, CancelCommissionRequest,
    GetBalanceRequest, Role, cancel_commission, get_balance, get_config, request_withdrawal,
    run_reconciliation, translate_core_error,
};

// ============================================================================
// Authentication
// ============================================================================

#[test]
fn test_anonymous_caller_is_unauthenticated() {
    let result: Result<AuthenticatedActor, AuthError> =
        AuthenticatedActor::authenticate(&CallerIdentity::anonymous());

    let err: ApiError = result.unwrap_err().into();
    assert_eq!(err.code(), "unauthenticated");
}

#[test]
fn test_blank_caller_id_is_unauthenticated() {
    let identity: CallerIdentity = CallerIdentity {
        caller_id: Some(String::from("   ")),
        is_admin: true,
    };

    assert!(matches!(
        AuthenticatedActor::authenticate(&identity),
        Err(AuthError::AuthenticationFailed { .. })
    ));
}

#[test]
fn test_admin_claim_grants_admin_role() {
    let admin: AuthenticatedActor =
        AuthenticatedActor::authenticate(&CallerIdentity::admin("ops-1")).unwrap();
    let affiliate: AuthenticatedActor =
        AuthenticatedActor::authenticate(&CallerIdentity::affiliate("prf_1")).unwrap();

    assert_eq!(admin.role, Role::Admin);
    assert!(admin.to_audit_actor().is_admin());
    assert_eq!(affiliate.role, Role::Affiliate);
    assert_eq!(affiliate.to_audit_actor().id, "prf_1");
    assert!(!affiliate.to_audit_actor().is_admin());
}

// ============================================================================
// Ownership
// ============================================================================

#[test]
fn test_affiliate_reads_own_balance() {
    let f: Fixture = create_fixture(&[1_000]);

    let response = get_balance(
        &f.engine,
        &create_test_affiliate(&f.referrer),
        &GetBalanceRequest {
            profile_id: f.referrer.as_str().to_string(),
        },
    )
    .unwrap();

    assert_eq!(response.pending, 1_000);
}

#[test]
fn test_affiliate_cannot_read_other_balance() {
    let f: Fixture = create_fixture(&[1_000]);

    let err: ApiError = get_balance(
        &f.engine,
        &create_test_affiliate(&f.client),
        &GetBalanceRequest {
            profile_id: f.referrer.as_str().to_string(),
        },
    )
    .unwrap_err();

    assert_eq!(err.code(), "permission-denied");
}

#[test]
fn test_admin_reads_any_balance() {
    let f: Fixture = create_fixture(&[1_000]);

    let response = get_balance(
        &f.engine,
        &create_test_admin(),
        &GetBalanceRequest {
            profile_id: f.referrer.as_str().to_string(),
        },
    )
    .unwrap();

    assert_eq!(response.total_earned, 1_000);
}

#[test]
fn test_admin_cannot_withdraw_for_affiliate() {
    let f: Fixture = create_fixture(&[5_000]);
    f.make_available();

    let err: ApiError = request_withdrawal(
        &f.payouts(false),
        &create_test_admin(),
        &create_withdrawal_request(&f.referrer, 5_000),
    )
    .unwrap_err();

    assert_eq!(err.code(), "permission-denied");
    assert_eq!(f.engine.ledger().balance_of(&f.referrer).unwrap().available, 5_000);
}

#[test]
fn test_affiliate_cannot_call_admin_operations() {
    let f: Fixture = create_fixture(&[1_000]);
    let affiliate: AuthenticatedActor = create_test_affiliate(&f.referrer);

    let cancel: ApiError = cancel_commission(
        &f.engine,
        &affiliate,
        &CancelCommissionRequest {
            commission_id: f.commissions[0].as_str().to_string(),
            reason: String::from("mine"),
        },
    )
    .unwrap_err();
    let config: ApiError = get_config(&f.engine, &affiliate).unwrap_err();
    let reconcile: ApiError = run_reconciliation(&f.engine, &affiliate).unwrap_err();

    for err in [cancel, config, reconcile] {
        assert!(matches!(err, ApiError::Unauthorized { ref required_role, .. } if required_role == "Admin"));
        assert_eq!(err.code(), "permission-denied");
    }
}

#[test]
fn test_unknown_profile_is_not_found() {
    let f: Fixture = create_fixture(&[]);

    let err: ApiError = get_balance(
        &f.engine,
        &create_test_admin(),
        &GetBalanceRequest {
            profile_id: ProfileId::new("prf_missing").as_str().to_string(),
        },
    )
    .unwrap_err();

    assert_eq!(err.code(), "not-found");
}

// ============================================================================
// Error translation
// ============================================================================

#[test]
fn test_store_failures_do_not_leak_details() {
    let err: ApiError = translate_core_error(CoreError::Store(StoreError::Backend(String::from(
        "disk I/O error at /var/lib/affilink.db",
    ))));

    assert_eq!(err.code(), "internal");
    assert!(!err.to_string().contains("/var/lib"));
}

#[test]
fn test_ledger_invariant_breach_is_internal() {
    let err: ApiError = translate_core_error(CoreError::Domain(DomainError::BalanceUnderflow {
        bucket: "available",
        current: 100,
        delta: -200,
    }));

    assert_eq!(err.code(), "internal");
    assert!(!err.to_string().contains("available"));
}

#[test]
fn test_precondition_failures_keep_their_message() {
    let err: ApiError = translate_core_error(CoreError::FailedPrecondition(String::from(
        "a withdrawal is already in progress",
    )));

    assert_eq!(err.code(), "failed-precondition");
    assert!(err.to_string().contains("already in progress"));
}
