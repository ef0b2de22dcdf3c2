// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use super::helpers::{
    TestEngine, call_event, create_test_admin, create_test_engine, load_commission, load_profile,
    manual_credit, register_affiliate, register_referred_client,
};
use crate::clock::Clock;
use crate::{
    CommissionCreationResult, CommissionInput, CoreError, LedgerStore, StoreError,
    TransitionOutcome,
};
use affilink_domain::{
    AffiliateProfile, Balance, CommissionId, CommissionStatus, CommissionType, ConfigUpdate,
    DomainError, ProfileStatus,
};
use time::Duration;

fn created_id(result: &CommissionCreationResult) -> CommissionId {
    match result {
        CommissionCreationResult::Created { commission_id, .. } => commission_id.clone(),
        other => panic!("expected a created commission, got {other:?}"),
    }
}

fn setup() -> (TestEngine, AffiliateProfile, affilink_domain::ProfileId) {
    let t: TestEngine = create_test_engine();
    let referrer: AffiliateProfile = register_affiliate(&t, "referrer@example.com");
    let client = register_referred_client(&t, &referrer, "client@example.com");
    (t, referrer, client)
}

// ============================================================================
// Creation
// ============================================================================

#[test]
fn test_created_commission_is_pending_and_credits_pending_bucket() {
    let (t, referrer, client) = setup();

    let result: CommissionCreationResult = t
        .engine
        .ledger()
        .create_commission(&manual_credit(&referrer.id, &client, "credit-1", 1_250))
        .unwrap();

    let id: CommissionId = created_id(&result);
    let commission = load_commission(&t, &id);
    assert_eq!(commission.status, CommissionStatus::Pending);
    assert_eq!(commission.amount, 1_250);
    assert_eq!(commission.hold_until, t.clock.now() + Duration::hours(72));
    assert_eq!(commission.available_at, t.clock.now() + Duration::hours(96));

    let balance: Balance = t.engine.ledger().balance_of(&referrer.id).unwrap();
    assert_eq!(balance.pending, 1_250);
    assert_eq!(balance.total_earned, 1_250);
    assert_eq!(balance.available, 0);
}

#[test]
fn test_duplicate_source_creates_nothing() {
    let (t, referrer, client) = setup();
    let input: CommissionInput = manual_credit(&referrer.id, &client, "credit-1", 1_000);

    let first = t.engine.ledger().create_commission(&input).unwrap();
    let second = t.engine.ledger().create_commission(&input).unwrap();

    assert_eq!(
        second,
        CommissionCreationResult::Duplicate {
            existing_id: created_id(&first)
        }
    );
    let balance: Balance = t.engine.ledger().balance_of(&referrer.id).unwrap();
    assert_eq!(balance.pending, 1_000);
    assert_eq!(t.engine.ledger().commissions_for(&referrer.id).unwrap().len(), 1);
}

#[test]
fn test_inactive_system_creates_nothing() {
    let (t, referrer, client) = setup();
    t.engine
        .context()
        .config
        .update_config(
            &ConfigUpdate {
                is_system_active: Some(false),
                ..ConfigUpdate::default()
            },
            &create_test_admin(),
            "maintenance",
        )
        .unwrap();

    let result = t
        .engine
        .ledger()
        .create_commission(&manual_credit(&referrer.id, &client, "credit-1", 1_000))
        .unwrap();

    assert_eq!(result, CommissionCreationResult::SystemInactive);
    assert!(t.engine.ledger().commissions_for(&referrer.id).unwrap().is_empty());
}

#[test]
fn test_suspended_referrer_earns_nothing() {
    let (t, referrer, client) = setup();
    let mut stored: AffiliateProfile = load_profile(&t, &referrer.id);
    stored.status = ProfileStatus::Suspended;
    t.store
        .run_transaction(|tx| tx.put_profile(&stored))
        .unwrap();

    let result = t
        .engine
        .ledger()
        .create_commission(&manual_credit(&referrer.id, &client, "credit-1", 1_000))
        .unwrap();

    assert_eq!(result, CommissionCreationResult::ReferrerInactive);
}

#[test]
fn test_unknown_referee_is_not_found() {
    let (t, referrer, _client) = setup();

    let result = t.engine.ledger().create_commission(&manual_credit(
        &referrer.id,
        &affilink_domain::ProfileId::new("prf_missing"),
        "credit-1",
        1_000,
    ));

    assert!(matches!(
        result,
        Err(CoreError::NotFound {
            entity: "profile",
            ..
        })
    ));
}

#[test]
fn test_short_call_does_not_meet_rule() {
    let (t, referrer, client) = setup();

    let outcome = t
        .engine
        .on_referred_action_completed(&call_event(&referrer.id, &client, "call-1", 45))
        .unwrap();

    assert!(matches!(
        outcome.direct.result,
        Ok(CommissionCreationResult::RuleNotMet { .. })
    ));
    assert_eq!(t.engine.ledger().balance_of(&referrer.id).unwrap(), Balance::default());
}

#[test]
fn test_zero_amount_creates_nothing() {
    let (t, referrer, client) = setup();

    let result = t
        .engine
        .ledger()
        .create_commission(&manual_credit(&referrer.id, &client, "credit-1", 0))
        .unwrap();

    assert_eq!(result, CommissionCreationResult::ZeroAmount);
}

#[test]
fn test_empty_source_id_is_invalid() {
    let (t, referrer, client) = setup();

    let result = t.engine.ledger().create_commission(&CommissionInput::new(
        referrer.id.clone(),
        client,
        CommissionType::Manual,
        "  ",
    ));

    assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
}

#[test]
fn test_zero_hold_period_makes_commission_available_immediately() {
    let (t, referrer, client) = setup();
    t.engine
        .context()
        .config
        .update_config(
            &ConfigUpdate {
                hold_period_hours: Some(0),
                ..ConfigUpdate::default()
            },
            &create_test_admin(),
            "instant payouts",
        )
        .unwrap();

    let result = t
        .engine
        .ledger()
        .create_commission(&manual_credit(&referrer.id, &client, "credit-1", 900))
        .unwrap();

    assert!(matches!(
        result,
        CommissionCreationResult::Created {
            status: CommissionStatus::Available,
            ..
        }
    ));
    let balance: Balance = t.engine.ledger().balance_of(&referrer.id).unwrap();
    assert_eq!(balance.available, 900);
    assert_eq!(balance.pending, 0);
}

// ============================================================================
// Rate capture
// ============================================================================

#[test]
fn test_captured_rates_survive_rate_changes() {
    let t: TestEngine = create_test_engine();
    let early: AffiliateProfile = register_affiliate(&t, "early@example.com");
    let mut rates = t.engine.context().config.get_config().unwrap().rates;
    rates.call_fixed_bonus = 2_000;
    t.engine
        .context()
        .config
        .update_config(
            &ConfigUpdate {
                rates: Some(rates),
                ..ConfigUpdate::default()
            },
            &create_test_admin(),
            "summer campaign",
        )
        .unwrap();
    let late: AffiliateProfile = register_affiliate(&t, "late@example.com");
    let early_client = register_referred_client(&t, &early, "one@example.com");
    let late_client = register_referred_client(&t, &late, "two@example.com");

    let early_outcome = t
        .engine
        .on_referred_action_completed(&call_event(&early.id, &early_client, "call-1", 300))
        .unwrap();
    let late_outcome = t
        .engine
        .on_referred_action_completed(&call_event(&late.id, &late_client, "call-2", 300))
        .unwrap();

    assert!(matches!(
        early_outcome.direct.result,
        Ok(CommissionCreationResult::Created { amount: 1_000, .. })
    ));
    assert!(matches!(
        late_outcome.direct.result,
        Ok(CommissionCreationResult::Created { amount: 2_000, .. })
    ));
    let early_profile: AffiliateProfile = load_profile(&t, &early.id);
    assert_eq!(
        early_profile.captured_rates.unwrap().rates.call_fixed_bonus,
        1_000
    );
}

#[test]
fn test_disabled_rule_applies_to_captured_referrers() {
    let (t, referrer, client) = setup();
    let mut rules = std::collections::BTreeMap::new();
    rules.insert(
        CommissionType::FirstCall,
        affilink_domain::CommissionRule::fixed(1_000).disabled(),
    );
    t.engine
        .context()
        .config
        .update_config(
            &ConfigUpdate {
                rules: Some(rules),
                ..ConfigUpdate::default()
            },
            &create_test_admin(),
            "pause first call bonus",
        )
        .unwrap();

    let outcome = t
        .engine
        .on_referred_action_completed(&call_event(&referrer.id, &client, "call-1", 300))
        .unwrap();

    assert!(matches!(
        outcome.direct.result,
        Ok(CommissionCreationResult::RuleNotMet { .. })
    ));
}

// ============================================================================
// Transitions
// ============================================================================

#[test]
fn test_validate_is_not_due_during_hold() {
    let (t, referrer, client) = setup();
    let id: CommissionId = created_id(
        &t.engine
            .ledger()
            .create_commission(&manual_credit(&referrer.id, &client, "credit-1", 1_000))
            .unwrap(),
    );

    t.clock.advance(Duration::hours(71));

    assert_eq!(
        t.engine.ledger().validate_commission(&id).unwrap(),
        TransitionOutcome::NotDue
    );
}

#[test]
fn test_validate_then_release_is_idempotent() {
    let (t, referrer, client) = setup();
    let id: CommissionId = created_id(
        &t.engine
            .ledger()
            .create_commission(&manual_credit(&referrer.id, &client, "credit-1", 1_000))
            .unwrap(),
    );

    t.clock.advance(Duration::hours(72));
    assert_eq!(
        t.engine.ledger().validate_commission(&id).unwrap(),
        TransitionOutcome::Advanced {
            from: CommissionStatus::Pending,
            to: CommissionStatus::Validated
        }
    );
    assert_eq!(
        t.engine.ledger().validate_commission(&id).unwrap(),
        TransitionOutcome::AlreadyAdvanced {
            status: CommissionStatus::Validated
        }
    );
    assert_eq!(
        t.engine.ledger().release_commission(&id).unwrap(),
        TransitionOutcome::NotDue
    );

    t.clock.advance(Duration::hours(24));
    assert!(matches!(
        t.engine.ledger().release_commission(&id).unwrap(),
        TransitionOutcome::Advanced {
            to: CommissionStatus::Available,
            ..
        }
    ));
    assert_eq!(
        t.engine.ledger().release_commission(&id).unwrap(),
        TransitionOutcome::AlreadyAdvanced {
            status: CommissionStatus::Available
        }
    );

    let balance: Balance = t.engine.ledger().balance_of(&referrer.id).unwrap();
    assert_eq!(balance.available, 1_000);
    assert_eq!(balance.pending + balance.validated, 0);
    assert_eq!(balance.total_earned, 1_000);
}

// ============================================================================
// Cancellation and adjustment
// ============================================================================

#[test]
fn test_cancel_debits_holding_bucket_and_keeps_total_earned() {
    let (t, referrer, client) = setup();
    let id: CommissionId = created_id(
        &t.engine
            .ledger()
            .create_commission(&manual_credit(&referrer.id, &client, "credit-1", 1_000))
            .unwrap(),
    );

    let cancelled = t
        .engine
        .ledger()
        .cancel_commission(&id, &create_test_admin(), "chargeback")
        .unwrap();

    assert_eq!(cancelled.status, CommissionStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("chargeback"));
    let balance: Balance = t.engine.ledger().balance_of(&referrer.id).unwrap();
    assert_eq!(balance.pending, 0);
    assert_eq!(balance.total_earned, 1_000);

    let events = t
        .store
        .run_transaction(|tx| tx.audit_events_for("commission", id.as_str()))
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action.name, "CancelCommission");
    assert_eq!(events[0].actor.id, "admin-1");
}

#[test]
fn test_cancel_twice_is_rejected() {
    let (t, referrer, client) = setup();
    let id: CommissionId = created_id(
        &t.engine
            .ledger()
            .create_commission(&manual_credit(&referrer.id, &client, "credit-1", 1_000))
            .unwrap(),
    );
    t.engine
        .ledger()
        .cancel_commission(&id, &create_test_admin(), "chargeback")
        .unwrap();

    let result = t
        .engine
        .ledger()
        .cancel_commission(&id, &create_test_admin(), "again");

    assert!(matches!(
        result,
        Err(CoreError::Domain(DomainError::InvalidStatusTransition { .. }))
    ));
    let balance: Balance = t.engine.ledger().balance_of(&referrer.id).unwrap();
    assert_eq!(balance.pending, 0);
}

#[test]
fn test_cancel_requires_reason() {
    let (t, referrer, client) = setup();
    let id: CommissionId = created_id(
        &t.engine
            .ledger()
            .create_commission(&manual_credit(&referrer.id, &client, "credit-1", 1_000))
            .unwrap(),
    );

    let result = t
        .engine
        .ledger()
        .cancel_commission(&id, &create_test_admin(), "");

    assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
}

#[test]
fn test_adjust_moves_bucket_and_total_by_difference() {
    let (t, referrer, client) = setup();
    let id: CommissionId = created_id(
        &t.engine
            .ledger()
            .create_commission(&manual_credit(&referrer.id, &client, "credit-1", 1_000))
            .unwrap(),
    );

    let adjusted = t
        .engine
        .ledger()
        .adjust_commission_amount(&id, 600, &create_test_admin(), "partial refund")
        .unwrap();

    assert_eq!(adjusted.amount, 600);
    assert_eq!(adjusted.adjustments.len(), 1);
    let balance: Balance = t.engine.ledger().balance_of(&referrer.id).unwrap();
    assert_eq!(balance.pending, 600);
    assert_eq!(balance.total_earned, 600);
    let profile: AffiliateProfile = load_profile(&t, &referrer.id);
    assert_eq!(profile.stats.for_type(CommissionType::Manual).amount, 600);
}

#[test]
fn test_adjust_rejects_negative_amount() {
    let (t, referrer, client) = setup();
    let id: CommissionId = created_id(
        &t.engine
            .ledger()
            .create_commission(&manual_credit(&referrer.id, &client, "credit-1", 1_000))
            .unwrap(),
    );

    let result = t
        .engine
        .ledger()
        .adjust_commission_amount(&id, -1, &create_test_admin(), "typo");

    assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
    assert_eq!(load_commission(&t, &id).amount, 1_000);
}

#[test]
fn test_unknown_commission_is_not_found() {
    let t: TestEngine = create_test_engine();

    let result = t
        .engine
        .ledger()
        .validate_commission(&CommissionId::new("com_missing"));

    assert!(matches!(
        result,
        Err(CoreError::NotFound {
            entity: "commission",
            ..
        })
    ));
}

// ============================================================================
// Transaction retries
// ============================================================================

#[test]
fn test_conflicting_commit_is_retried() {
    let (t, referrer, client) = setup();
    t.store.force_conflicts(2);

    let result = t
        .engine
        .ledger()
        .create_commission(&manual_credit(&referrer.id, &client, "credit-1", 1_000))
        .unwrap();

    assert!(result.is_created());
    assert_eq!(t.engine.ledger().commissions_for(&referrer.id).unwrap().len(), 1);
    assert_eq!(t.engine.ledger().balance_of(&referrer.id).unwrap().pending, 1_000);
}

#[test]
fn test_persistent_conflict_gives_up() {
    let (t, referrer, client) = setup();
    t.store.force_conflicts(crate::MAX_TRANSACTION_ATTEMPTS);

    let result = t
        .engine
        .ledger()
        .create_commission(&manual_credit(&referrer.id, &client, "credit-1", 1_000));

    assert!(matches!(
        result,
        Err(CoreError::Store(StoreError::Conflict(_)))
    ));
    assert!(t.engine.ledger().commissions_for(&referrer.id).unwrap().is_empty());
}
