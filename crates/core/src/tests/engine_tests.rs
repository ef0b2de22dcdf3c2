// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use super::helpers::{
    TestEngine, call_event, create_test_admin, create_test_engine,
    create_test_engine_with_scorer, load_profile, referred_registration, register_affiliate,
    register_referred_client, registration,
};
use crate::{
    ActionEvent, ActionOutcome, AttributionRejection, AttributionStatus, Clock,
    CommissionCreationResult, CoreError, FraudScorer, LedgerStore, ReferredAction,
    RegistrationOutcome, SubscriptionPeriod,
};
use affilink_domain::{
    AffiliateProfile, BaseAmounts, CodeSlot, CommissionRule, CommissionType, ConfigUpdate,
    EvaluationContext, FraudAlert, FraudAssessment, FraudDecision, FraudIssue, FraudSettings,
    FraudSignals, FraudStatus, ProfileId, ProfileKind, Referral, ReferralScheme, RuleConditions,
    SharedSignal, SignupSignals,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use time::Duration;
use time::macros::date;

fn code_of(profile: &AffiliateProfile, slot: CodeSlot) -> String {
    profile.code(slot).expect("code for slot").to_string()
}

fn client_edge(t: &TestEngine, referee: &ProfileId) -> Option<Referral> {
    t.store
        .run_transaction(|tx| tx.referral(referee, ReferralScheme::Client))
        .unwrap()
}

fn enable_signup_bonus(t: &TestEngine) {
    let mut rules: BTreeMap<CommissionType, CommissionRule> = BTreeMap::new();
    rules.insert(
        CommissionType::Signup,
        CommissionRule::fixed(200).with_conditions(RuleConditions {
            require_email_verification: true,
            ..RuleConditions::default()
        }),
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
            "launch signup bonus",
        )
        .unwrap();
}

fn register_with_capture_age(t: &TestEngine, referrer: &AffiliateProfile, age: Duration) -> RegistrationOutcome {
    t.engine
        .on_user_registered(&referred_registration(
            ProfileKind::Client,
            "client@example.com",
            &code_of(referrer, CodeSlot::Generic),
            Some(t.clock.now() - age),
        ))
        .unwrap()
}

// ============================================================================
// Registration
// ============================================================================

#[test]
fn test_affiliate_registration_captures_rates_and_codes() {
    let t: TestEngine = create_test_engine();

    let affiliate: AffiliateProfile = register_affiliate(&t, "affiliate@example.com");

    assert_eq!(affiliate.codes.len(), 4);
    let captured = affiliate.captured_rates.expect("rates captured");
    assert_eq!(captured.config_version, 1);
    assert_eq!(captured.captured_at, t.clock.now());
    assert_eq!(affiliate.fraud_status, FraudStatus::Clear);
}

#[test]
fn test_client_registration_has_single_code_and_no_rates() {
    let t: TestEngine = create_test_engine();

    let outcome: RegistrationOutcome = t
        .engine
        .on_user_registered(&registration(ProfileKind::Client, "client@example.com"))
        .unwrap();

    assert_eq!(outcome.attribution, AttributionStatus::NoReferral);
    assert_eq!(outcome.codes.len(), 1);
    assert!(load_profile(&t, &outcome.profile_id).captured_rates.is_none());
}

#[test]
fn test_registration_rejects_bad_email() {
    let t: TestEngine = create_test_engine();

    let result = t
        .engine
        .on_user_registered(&registration(ProfileKind::Client, "not-an-email"));

    assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
}

// ============================================================================
// Attribution
// ============================================================================

#[test]
fn test_capture_just_inside_window_is_attributed() {
    let t: TestEngine = create_test_engine();
    let referrer: AffiliateProfile = register_affiliate(&t, "referrer@example.com");

    let outcome: RegistrationOutcome = register_with_capture_age(
        &t,
        &referrer,
        Duration::days(29) + Duration::hours(23) + Duration::minutes(59),
    );

    assert!(matches!(
        outcome.attribution,
        AttributionStatus::Attributed { .. }
    ));
    let edge: Referral = client_edge(&t, &outcome.profile_id).expect("edge created");
    assert_eq!(edge.referrer_id, referrer.id);
    assert_eq!(edge.code_slot, CodeSlot::Generic);
    assert_eq!(edge.attributed_at, t.clock.now());
}

#[test]
fn test_capture_exactly_at_window_is_attributed() {
    let t: TestEngine = create_test_engine();
    let referrer: AffiliateProfile = register_affiliate(&t, "referrer@example.com");

    let outcome: RegistrationOutcome = register_with_capture_age(&t, &referrer, Duration::days(30));

    assert!(matches!(
        outcome.attribution,
        AttributionStatus::Attributed { .. }
    ));
}

#[test]
fn test_capture_past_window_is_expired() {
    for age in [
        Duration::days(30) + Duration::minutes(1),
        Duration::days(31),
    ] {
        let t: TestEngine = create_test_engine();
        let referrer: AffiliateProfile = register_affiliate(&t, "referrer@example.com");

        let outcome: RegistrationOutcome = register_with_capture_age(&t, &referrer, age);

        assert_eq!(
            outcome.attribution,
            AttributionStatus::NotAttributed(AttributionRejection::Expired)
        );
        assert!(client_edge(&t, &outcome.profile_id).is_none());
    }
}

#[test]
fn test_missing_capture_time_is_not_attributed() {
    let t: TestEngine = create_test_engine();
    let referrer: AffiliateProfile = register_affiliate(&t, "referrer@example.com");

    let outcome: RegistrationOutcome = t
        .engine
        .on_user_registered(&referred_registration(
            ProfileKind::Client,
            "client@example.com",
            &code_of(&referrer, CodeSlot::Generic),
            None,
        ))
        .unwrap();

    assert_eq!(
        outcome.attribution,
        AttributionStatus::NotAttributed(AttributionRejection::MissingCaptureTime)
    );
    assert!(client_edge(&t, &outcome.profile_id).is_none());
}

#[test]
fn test_unknown_code_is_not_attributed() {
    let t: TestEngine = create_test_engine();

    let outcome: RegistrationOutcome = t
        .engine
        .on_user_registered(&referred_registration(
            ProfileKind::Client,
            "client@example.com",
            "NOPE1234",
            Some(t.clock.now()),
        ))
        .unwrap();

    assert_eq!(
        outcome.attribution,
        AttributionStatus::NotAttributed(AttributionRejection::UnknownCode)
    );
}

#[test]
fn test_code_lookup_normalizes_and_reports_slot() {
    let t: TestEngine = create_test_engine();
    let referrer: AffiliateProfile = register_affiliate(&t, "referrer@example.com");
    let raw: String = format!(
        "  {}  ",
        code_of(&referrer, CodeSlot::Recruitment).to_lowercase()
    );

    let resolved = t.engine.resolver().resolve_code(&raw).unwrap().expect("resolved");

    assert_eq!(resolved.referrer_id, referrer.id);
    assert_eq!(resolved.slot, CodeSlot::Recruitment);
    assert_eq!(resolved.referrer_kind, ProfileKind::Chatter);
}

#[test]
fn test_same_mailbox_is_self_referral() {
    let t: TestEngine = create_test_engine();
    let referrer: AffiliateProfile = register_affiliate(&t, "owner@example.com");

    let outcome: RegistrationOutcome = t
        .engine
        .on_user_registered(&referred_registration(
            ProfileKind::Client,
            "Owner+second@example.com",
            &code_of(&referrer, CodeSlot::Generic),
            Some(t.clock.now()),
        ))
        .unwrap();

    assert_eq!(
        outcome.attribution,
        AttributionStatus::NotAttributed(AttributionRejection::SharedSignals {
            signals: vec![SharedSignal::SameEmail],
            severity: 100,
        })
    );
}

#[test]
fn test_shared_ip_alone_is_not_self_referral() {
    let t: TestEngine = create_test_engine();
    let signals: SignupSignals = SignupSignals {
        ip_address: Some(String::from("198.51.100.4")),
        device_fingerprint: None,
    };
    let referrer_id: ProfileId = t
        .engine
        .on_user_registered(&crate::Registration {
            signals: signals.clone(),
            ..registration(ProfileKind::Chatter, "referrer@example.com")
        })
        .unwrap()
        .profile_id;
    let referrer: AffiliateProfile = load_profile(&t, &referrer_id);

    let outcome: RegistrationOutcome = t
        .engine
        .on_user_registered(&crate::Registration {
            signals,
            ..referred_registration(
                ProfileKind::Client,
                "roommate@example.com",
                &code_of(&referrer, CodeSlot::Generic),
                Some(t.clock.now()),
            )
        })
        .unwrap();

    assert!(matches!(
        outcome.attribution,
        AttributionStatus::Attributed { .. }
    ));
}

// ============================================================================
// Fraud gate
// ============================================================================

#[test]
fn test_high_risk_signup_is_blocked_without_edge() {
    let t: TestEngine = create_test_engine();
    let shared_ip: SignupSignals = SignupSignals {
        ip_address: Some(String::from("203.0.113.7")),
        device_fingerprint: None,
    };
    let referrer_id: ProfileId = t
        .engine
        .on_user_registered(&crate::Registration {
            signals: shared_ip.clone(),
            ..registration(ProfileKind::Chatter, "referrer@example.com")
        })
        .unwrap()
        .profile_id;
    let referrer: AffiliateProfile = load_profile(&t, &referrer_id);
    register_referred_client(&t, &referrer, "janedoe@example.com");

    let outcome: RegistrationOutcome = t
        .engine
        .on_user_registered(&crate::Registration {
            signals: shared_ip,
            ..referred_registration(
                ProfileKind::Client,
                "janedoe1@mailinator.com",
                &code_of(&referrer, CodeSlot::Generic),
                Some(t.clock.now()),
            )
        })
        .unwrap();

    assert_eq!(
        outcome.attribution,
        AttributionStatus::Blocked {
            referrer_id: referrer.id.clone()
        }
    );
    assert!(client_edge(&t, &outcome.profile_id).is_none());
    assert_eq!(
        load_profile(&t, &outcome.profile_id).fraud_status,
        FraudStatus::UnderReview
    );
    let alerts: Vec<FraudAlert> = t
        .engine
        .fraud_gate()
        .alerts_for(&outcome.profile_id)
        .unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].decision, FraudDecision::Block);
    assert_eq!(alerts[0].score, 85);
    assert_eq!(
        alerts[0].issues,
        vec![
            FraudIssue::SameIpAsReferrer,
            FraudIssue::DisposableEmail,
            FraudIssue::SimilarEmails
        ]
    );
}

struct BrokenScorer;

impl FraudScorer for BrokenScorer {
    fn score(
        &self,
        _signals: &FraudSignals,
        _settings: &FraudSettings,
    ) -> Result<FraudAssessment, String> {
        Err(String::from("model unavailable"))
    }
}

#[test]
fn test_scorer_failure_attributes_for_manual_review() {
    let t: TestEngine = create_test_engine_with_scorer(Arc::new(BrokenScorer));
    let referrer: AffiliateProfile = register_affiliate(&t, "referrer@example.com");

    let outcome: RegistrationOutcome = t
        .engine
        .on_user_registered(&referred_registration(
            ProfileKind::Client,
            "client@example.com",
            &code_of(&referrer, CodeSlot::Generic),
            Some(t.clock.now()),
        ))
        .unwrap();

    assert_eq!(
        outcome.attribution,
        AttributionStatus::Attributed {
            referrer_id: referrer.id.clone(),
            scheme: ReferralScheme::Client,
            flagged_for_review: true,
        }
    );
    assert!(client_edge(&t, &outcome.profile_id).unwrap().fraud_review);
    let alerts: Vec<FraudAlert> = t
        .engine
        .fraud_gate()
        .alerts_for(&outcome.profile_id)
        .unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].issues, vec![FraudIssue::ScoringUnavailable]);
}

// ============================================================================
// Action events
// ============================================================================

#[test]
fn test_signup_then_first_call_then_recurring() {
    let t: TestEngine = create_test_engine();
    enable_signup_bonus(&t);
    let referrer: AffiliateProfile = register_affiliate(&t, "referrer@example.com");

    let registered: RegistrationOutcome = t
        .engine
        .on_user_registered(&referred_registration(
            ProfileKind::Client,
            "client@example.com",
            &code_of(&referrer, CodeSlot::Generic),
            Some(t.clock.now() - Duration::days(2)),
        ))
        .unwrap();
    let client: ProfileId = registered.profile_id.clone();
    let first: ActionOutcome = t
        .engine
        .on_referred_action_completed(&call_event(&referrer.id, &client, "call-1", 300))
        .unwrap();
    let second: ActionOutcome = t
        .engine
        .on_referred_action_completed(&call_event(&referrer.id, &client, "call-2", 300))
        .unwrap();

    assert!(matches!(
        registered.signup_commission,
        Some(Ok(CommissionCreationResult::Created { amount: 200, .. }))
    ));
    assert_eq!(first.direct.commission_type, CommissionType::FirstCall);
    assert!(matches!(
        first.direct.result,
        Ok(CommissionCreationResult::Created { amount: 1_000, .. })
    ));
    assert_eq!(second.direct.commission_type, CommissionType::RecurringCall);
    assert!(matches!(
        second.direct.result,
        Ok(CommissionCreationResult::Created { amount: 500, .. })
    ));
    let balance = t.engine.ledger().balance_of(&referrer.id).unwrap();
    assert_eq!(balance.pending, 1_700);
    assert_eq!(
        client_edge(&t, &client).unwrap().total_commissions,
        1_700
    );
}

#[test]
fn test_unverified_client_earns_no_signup_bonus() {
    let t: TestEngine = create_test_engine();
    enable_signup_bonus(&t);
    let referrer: AffiliateProfile = register_affiliate(&t, "referrer@example.com");

    let registered: RegistrationOutcome = t
        .engine
        .on_user_registered(&crate::Registration {
            email_verified: false,
            ..referred_registration(
                ProfileKind::Client,
                "client@example.com",
                &code_of(&referrer, CodeSlot::Generic),
                Some(t.clock.now()),
            )
        })
        .unwrap();

    assert!(matches!(
        registered.signup_commission,
        Some(Ok(CommissionCreationResult::RuleNotMet { .. }))
    ));
}

#[test]
fn test_redelivered_calls_are_duplicates() {
    let t: TestEngine = create_test_engine();
    let referrer: AffiliateProfile = register_affiliate(&t, "referrer@example.com");
    let client: ProfileId = register_referred_client(&t, &referrer, "client@example.com");
    t.engine
        .on_referred_action_completed(&call_event(&referrer.id, &client, "call-1", 300))
        .unwrap();
    t.engine
        .on_referred_action_completed(&call_event(&referrer.id, &client, "call-2", 300))
        .unwrap();

    let first_again: ActionOutcome = t
        .engine
        .on_referred_action_completed(&call_event(&referrer.id, &client, "call-1", 300))
        .unwrap();
    let second_again: ActionOutcome = t
        .engine
        .on_referred_action_completed(&call_event(&referrer.id, &client, "call-2", 300))
        .unwrap();

    assert_eq!(first_again.direct.commission_type, CommissionType::FirstCall);
    assert!(matches!(
        first_again.direct.result,
        Ok(CommissionCreationResult::Duplicate { .. })
    ));
    assert_eq!(
        second_again.direct.commission_type,
        CommissionType::RecurringCall
    );
    assert!(matches!(
        second_again.direct.result,
        Ok(CommissionCreationResult::Duplicate { .. })
    ));
    assert_eq!(t.engine.ledger().commissions_for(&referrer.id).unwrap().len(), 2);
    assert_eq!(t.engine.ledger().balance_of(&referrer.id).unwrap().pending, 1_500);
}

fn subscription_event(
    referrer: &ProfileId,
    client: &ProfileId,
    action: ReferredAction,
    source: &str,
    period: SubscriptionPeriod,
) -> ActionEvent {
    ActionEvent {
        action,
        referrer_id: referrer.clone(),
        referee_id: client.clone(),
        source_id: source.to_string(),
        bases: BaseAmounts {
            total_amount: Some(2_000),
            first_month: Some(2_000),
            ..BaseAmounts::default()
        },
        context: EvaluationContext::default(),
        subscription: Some(period),
    }
}

#[test]
fn test_subscription_and_renewals_follow_month_limit() {
    let t: TestEngine = create_test_engine();
    let referrer: AffiliateProfile = register_affiliate(&t, "referrer@example.com");
    let client: ProfileId = register_referred_client(&t, &referrer, "client@example.com");
    let started_on = date!(2025 - 01 - 31);

    let created: ActionOutcome = t
        .engine
        .on_referred_action_completed(&subscription_event(
            &referrer.id,
            &client,
            ReferredAction::SubscriptionCreated,
            "sub-1:2025-01",
            SubscriptionPeriod {
                started_on,
                period_start: started_on,
            },
        ))
        .unwrap();
    let third_month: ActionOutcome = t
        .engine
        .on_referred_action_completed(&subscription_event(
            &referrer.id,
            &client,
            ReferredAction::SubscriptionRenewed,
            "sub-1:2025-03",
            SubscriptionPeriod {
                started_on,
                period_start: date!(2025 - 03 - 31),
            },
        ))
        .unwrap();
    let thirteenth_month: ActionOutcome = t
        .engine
        .on_referred_action_completed(&subscription_event(
            &referrer.id,
            &client,
            ReferredAction::SubscriptionRenewed,
            "sub-1:2026-01",
            SubscriptionPeriod {
                started_on,
                period_start: date!(2026 - 01 - 31),
            },
        ))
        .unwrap();

    assert!(matches!(
        created.direct.result,
        Ok(CommissionCreationResult::Created { amount: 200, .. })
    ));
    assert!(matches!(
        third_month.direct.result,
        Ok(CommissionCreationResult::Created { amount: 100, .. })
    ));
    assert!(matches!(
        thirteenth_month.direct.result,
        Ok(CommissionCreationResult::RuleNotMet { .. })
    ));
    assert!(created.network.is_empty());
}

#[test]
fn test_malformed_events_are_rejected_before_side_effects() {
    let t: TestEngine = create_test_engine();
    let referrer: AffiliateProfile = register_affiliate(&t, "referrer@example.com");
    let client: ProfileId = register_referred_client(&t, &referrer, "client@example.com");
    let mut negative: ActionEvent = call_event(&referrer.id, &client, "call-1", 300);
    negative.bases.connection_fee = Some(-5);
    let mut renewal: ActionEvent = call_event(&referrer.id, &client, "sub-1:2", 300);
    renewal.action = ReferredAction::SubscriptionRenewed;

    for event in [
        call_event(&referrer.id, &client, "", 300),
        call_event(&referrer.id, &referrer.id, "call-1", 300),
        negative,
        renewal,
    ] {
        let result = t.engine.on_referred_action_completed(&event);
        assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
    }
    assert!(t.engine.ledger().commissions_for(&referrer.id).unwrap().is_empty());
}
