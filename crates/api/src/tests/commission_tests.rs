// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use affilink_domain::{Balance, CommissionStatus};

use super::helpers::{Fixture, create_fixture, create_test_admin, create_test_affiliate};
use crate::{
    AdjustCommissionRequest, ApiError, CancelCommissionRequest, CommissionActionResponse,
    ListCommissionsRequest, ListCommissionsResponse, adjust_commission, cancel_commission,
    list_commissions, run_reconciliation,
};

fn list_request(f: &Fixture, status: Option<&str>, limit: Option<usize>) -> ListCommissionsRequest {
    ListCommissionsRequest {
        profile_id: f.referrer.as_str().to_string(),
        status: status.map(str::to_string),
        limit,
    }
}

// ============================================================================
// Listing
// ============================================================================

#[test]
fn test_list_returns_newest_first() {
    let f: Fixture = create_fixture(&[100, 200, 300]);

    let response: ListCommissionsResponse = list_commissions(
        &f.engine,
        &create_test_affiliate(&f.referrer),
        &list_request(&f, None, None),
    )
    .unwrap();

    let amounts: Vec<i64> = response.commissions.iter().map(|c| c.amount).collect();
    assert_eq!(amounts, vec![300, 200, 100]);
    assert_eq!(response.total, 3);
    assert!(response.commissions.iter().all(|c| c.status == "pending"));
}

#[test]
fn test_list_applies_limit_after_counting() {
    let f: Fixture = create_fixture(&[100, 200, 300]);

    let response: ListCommissionsResponse = list_commissions(
        &f.engine,
        &create_test_admin(),
        &list_request(&f, None, Some(2)),
    )
    .unwrap();

    assert_eq!(response.commissions.len(), 2);
    assert_eq!(response.total, 3);
}

#[test]
fn test_list_filters_by_status() {
    let f: Fixture = create_fixture(&[100, 200]);
    cancel_commission(
        &f.engine,
        &create_test_admin(),
        &CancelCommissionRequest {
            commission_id: f.commissions[0].as_str().to_string(),
            reason: String::from("refund"),
        },
    )
    .unwrap();

    let cancelled: ListCommissionsResponse = list_commissions(
        &f.engine,
        &create_test_admin(),
        &list_request(&f, Some("cancelled"), None),
    )
    .unwrap();

    assert_eq!(cancelled.total, 1);
    assert_eq!(cancelled.commissions[0].amount, 100);
}

#[test]
fn test_list_rejects_unknown_status_and_bad_limit() {
    let f: Fixture = create_fixture(&[100]);

    let status: ApiError = list_commissions(
        &f.engine,
        &create_test_admin(),
        &list_request(&f, Some("settled"), None),
    )
    .unwrap_err();
    let zero: ApiError = list_commissions(
        &f.engine,
        &create_test_admin(),
        &list_request(&f, None, Some(0)),
    )
    .unwrap_err();
    let huge: ApiError = list_commissions(
        &f.engine,
        &create_test_admin(),
        &list_request(&f, None, Some(201)),
    )
    .unwrap_err();

    assert!(matches!(status, ApiError::InvalidInput { ref field, .. } if field == "status"));
    assert!(matches!(zero, ApiError::InvalidInput { ref field, .. } if field == "limit"));
    assert_eq!(huge.code(), "invalid-argument");
}

// ============================================================================
// Corrections
// ============================================================================

#[test]
fn test_cancel_removes_amount_from_bucket() {
    let f: Fixture = create_fixture(&[1_000, 500]);

    let response: CommissionActionResponse = cancel_commission(
        &f.engine,
        &create_test_admin(),
        &CancelCommissionRequest {
            commission_id: f.commissions[0].as_str().to_string(),
            reason: String::from("chargeback"),
        },
    )
    .unwrap();

    assert_eq!(response.commission.status, "cancelled");
    let balance: Balance = f.engine.ledger().balance_of(&f.referrer).unwrap();
    assert_eq!(balance.pending, 500);
    assert_eq!(balance.total_earned, 1_500);
}

#[test]
fn test_cancel_requires_reason_before_touching_ledger() {
    let f: Fixture = create_fixture(&[1_000]);

    let err: ApiError = cancel_commission(
        &f.engine,
        &create_test_admin(),
        &CancelCommissionRequest {
            commission_id: f.commissions[0].as_str().to_string(),
            reason: String::from("  "),
        },
    )
    .unwrap_err();

    assert!(matches!(err, ApiError::InvalidInput { ref field, .. } if field == "reason"));
    assert_eq!(
        f.engine.ledger().commission(&f.commissions[0]).unwrap().status,
        CommissionStatus::Pending
    );
}

#[test]
fn test_cancel_unknown_commission_is_not_found() {
    let f: Fixture = create_fixture(&[]);

    let err: ApiError = cancel_commission(
        &f.engine,
        &create_test_admin(),
        &CancelCommissionRequest {
            commission_id: String::from("com_missing"),
            reason: String::from("typo"),
        },
    )
    .unwrap_err();

    assert_eq!(err.code(), "not-found");
}

#[test]
fn test_adjust_changes_amount() {
    let f: Fixture = create_fixture(&[1_000]);

    let response: CommissionActionResponse = adjust_commission(
        &f.engine,
        &create_test_admin(),
        &AdjustCommissionRequest {
            commission_id: f.commissions[0].as_str().to_string(),
            new_amount: 600,
            reason: String::from("partial refund"),
        },
    )
    .unwrap();

    assert_eq!(response.commission.amount, 600);
    assert_eq!(f.engine.ledger().balance_of(&f.referrer).unwrap().pending, 600);
}

#[test]
fn test_adjust_rejects_non_positive_amount() {
    let f: Fixture = create_fixture(&[1_000]);

    let err: ApiError = adjust_commission(
        &f.engine,
        &create_test_admin(),
        &AdjustCommissionRequest {
            commission_id: f.commissions[0].as_str().to_string(),
            new_amount: 0,
            reason: String::from("zero it"),
        },
    )
    .unwrap_err();

    assert!(matches!(err, ApiError::InvalidInput { ref field, .. } if field == "new_amount"));
}

// ============================================================================
// Reconciliation
// ============================================================================

#[test]
fn test_manual_reconciliation_releases_due_commissions() {
    let f: Fixture = create_fixture(&[1_000, 2_000]);
    f.clock.advance(time::Duration::hours(97));

    let response = run_reconciliation(&f.engine, &create_test_admin()).unwrap();

    assert_eq!(response.validated.advanced, 2);
    assert_eq!(response.validated.failed, 0);
    let balance: Balance = f.engine.ledger().balance_of(&f.referrer).unwrap();
    assert_eq!(balance.pending, 0);
    assert_eq!(balance.available, 3_000);
}
