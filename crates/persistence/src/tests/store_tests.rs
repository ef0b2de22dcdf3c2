// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use super::{
    OfflineProvider, SqliteEngine, create_sqlite_engine, create_test_payment_details, credit,
    load_profile, register_affiliate, register_client_of, test_now,
};
use crate::SqliteStore;
use affilink::{AffiliateEngine, Clock, DueCursor, LedgerStore, ManualClock, StoreError};
use affilink_domain::{
    AffiliateConfig, AffiliateProfile, CodeSlot, Commission, CommissionId, CommissionStatus,
    CommissionType, ProfileId, Withdrawal, WithdrawalId,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

#[test]
fn test_in_memory_databases_are_isolated() {
    let first: SqliteStore = SqliteStore::new_in_memory().unwrap();
    let second: SqliteStore = SqliteStore::new_in_memory().unwrap();

    first
        .run_transaction(|tx| tx.put_config(&AffiliateConfig::default()))
        .unwrap();

    let other: Option<AffiliateConfig> = second.run_transaction(|tx| tx.config()).unwrap();
    assert!(other.is_none());
}

#[test]
fn test_profile_and_codes_round_trip() {
    let t: SqliteEngine = create_sqlite_engine();

    let profile: AffiliateProfile = register_affiliate(&t, "earner@example.com");

    assert_eq!(profile.email, "earner@example.com");
    assert_eq!(profile.created_at, test_now());
    for code in &profile.codes {
        let owner: Option<ProfileId> = t
            .store
            .run_transaction(|tx| tx.find_profile_by_code(code.slot, &code.code))
            .unwrap();
        assert_eq!(owner.as_ref(), Some(&profile.id));
    }
    let wrong_slot: Option<ProfileId> = t
        .store
        .run_transaction(|tx| {
            tx.find_profile_by_code(
                CodeSlot::Recruitment,
                profile.code(CodeSlot::Generic).unwrap_or_default(),
            )
        })
        .unwrap();
    assert!(wrong_slot.is_none());
}

#[test]
fn test_reused_code_is_duplicate() {
    let t: SqliteEngine = create_sqlite_engine();
    let profile: AffiliateProfile = register_affiliate(&t, "earner@example.com");
    let mut copy: AffiliateProfile = profile.clone();
    copy.id = ProfileId::new("prf_copy");

    let result = t.store.run_transaction(|tx| tx.insert_profile(&copy));

    assert!(matches!(
        result,
        Err(StoreError::Duplicate {
            entity: "referral code",
            ..
        })
    ));
    let missing: Option<AffiliateProfile> = t
        .store
        .run_transaction(|tx| tx.profile(&copy.id))
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_update_of_missing_profile_is_not_found() {
    let t: SqliteEngine = create_sqlite_engine();
    let mut profile: AffiliateProfile = register_affiliate(&t, "earner@example.com");
    profile.id = ProfileId::new("prf_missing");

    let result = t.store.run_transaction(|tx| tx.put_profile(&profile));

    assert!(matches!(result, Err(StoreError::NotFound { entity: "profile", .. })));
}

#[test]
fn test_commission_source_key_is_unique() {
    let t: SqliteEngine = create_sqlite_engine();
    let referrer: AffiliateProfile = register_affiliate(&t, "earner@example.com");
    let client: ProfileId = register_client_of(&t, &referrer, "client@example.com");
    let id: CommissionId = credit(&t, &referrer.id, &client, "order-1", 1_500);
    let mut copy: Commission = t.engine.ledger().commission(&id).unwrap();
    copy.id = CommissionId::new("com_copy");

    let result = t.store.run_transaction(|tx| tx.insert_commission(&copy));

    assert!(matches!(
        result,
        Err(StoreError::Duplicate {
            entity: "commission",
            ..
        })
    ));
}

#[test]
fn test_failed_body_rolls_back_every_write() {
    let t: SqliteEngine = create_sqlite_engine();
    let referrer: AffiliateProfile = register_affiliate(&t, "earner@example.com");
    let client: ProfileId = register_client_of(&t, &referrer, "client@example.com");
    let id: CommissionId = credit(&t, &referrer.id, &client, "order-1", 1_500);

    let result: Result<(), StoreError> = t.store.run_transaction(|tx| {
        let mut commission: Commission = tx.commission(&id)?.expect("commission");
        commission.status = CommissionStatus::Cancelled;
        tx.put_commission(&commission)?;
        Err(StoreError::Rejected(String::from("abort")))
    });

    assert!(matches!(result, Err(StoreError::Rejected(_))));
    assert_eq!(
        t.engine.ledger().commission(&id).unwrap().status,
        CommissionStatus::Pending
    );
}

#[test]
fn test_due_commissions_are_ordered_and_limited() {
    let t: SqliteEngine = create_sqlite_engine();
    let referrer: AffiliateProfile = register_affiliate(&t, "earner@example.com");
    let client: ProfileId = register_client_of(&t, &referrer, "client@example.com");
    let mut created: Vec<CommissionId> = Vec::new();
    for n in 0..4 {
        t.clock.advance(Duration::minutes(1));
        created.push(credit(&t, &referrer.id, &client, &format!("order-{n}"), 500));
    }
    let cutoff: OffsetDateTime = test_now() + Duration::minutes(3) + Duration::hours(72);

    let due: Vec<Commission> = t
        .store
        .run_transaction(|tx| tx.due_commissions(CommissionStatus::Pending, cutoff, None, 2))
        .unwrap();
    let all_due: Vec<Commission> = t
        .store
        .run_transaction(|tx| tx.due_commissions(CommissionStatus::Pending, cutoff, None, 10))
        .unwrap();
    let cursor: DueCursor = DueCursor {
        due_at: due[1].hold_until,
        id: due[1].id.clone(),
    };
    let rest: Vec<Commission> = t
        .store
        .run_transaction(|tx| {
            tx.due_commissions(CommissionStatus::Pending, cutoff, Some(&cursor), 10)
        })
        .unwrap();

    let ids: Vec<CommissionId> = due.into_iter().map(|c| c.id).collect();
    assert_eq!(ids, created[..2].to_vec());
    assert_eq!(all_due.len(), 3);
    let rest_ids: Vec<CommissionId> = rest.into_iter().map(|c| c.id).collect();
    assert_eq!(rest_ids, vec![created[2].clone()]);
}

#[test]
fn test_count_commissions_respects_filters() {
    let t: SqliteEngine = create_sqlite_engine();
    let referrer: AffiliateProfile = register_affiliate(&t, "earner@example.com");
    let first: ProfileId = register_client_of(&t, &referrer, "first@example.com");
    let second: ProfileId = register_client_of(&t, &referrer, "second@example.com");
    credit(&t, &referrer.id, &first, "order-1", 500);
    t.clock.advance(Duration::days(2));
    credit(&t, &referrer.id, &second, "order-2", 500);
    let cancelled: CommissionId = credit(&t, &referrer.id, &second, "order-3", 500);
    t.engine
        .ledger()
        .cancel_commission(&cancelled, &affilink_audit::Actor::admin("admin-1"), "refund")
        .unwrap();

    let count = |referee: Option<&ProfileId>, since: Option<OffsetDateTime>| -> u32 {
        t.store
            .run_transaction(|tx| {
                tx.count_commissions(&referrer.id, CommissionType::Manual, referee, since)
            })
            .unwrap()
    };

    assert_eq!(count(None, None), 2);
    assert_eq!(count(Some(&second), None), 1);
    assert_eq!(count(None, Some(test_now() + Duration::days(1))), 1);
}

#[test]
fn test_only_one_active_withdrawal_per_referrer() {
    let t: SqliteEngine = create_sqlite_engine();
    let referrer: AffiliateProfile = register_affiliate(&t, "earner@example.com");
    let client: ProfileId = register_client_of(&t, &referrer, "client@example.com");
    credit(&t, &referrer.id, &client, "order-1", 5_000);
    t.clock.advance(Duration::hours(97));
    t.engine.reconciler().validate_pass().unwrap();
    t.engine.reconciler().release_pass().unwrap();
    let payouts = t.engine.payouts(Arc::new(OfflineProvider));
    let withdrawal: Withdrawal = payouts
        .request_withdrawal(&referrer.id, 5_000, &create_test_payment_details())
        .unwrap();
    let mut copy: Withdrawal = withdrawal.clone();
    copy.id = WithdrawalId::new("wdr_copy");

    let result = t.store.run_transaction(|tx| tx.insert_withdrawal(&copy));

    assert!(matches!(
        result,
        Err(StoreError::Duplicate {
            entity: "active withdrawal",
            ..
        })
    ));
    let active: Option<Withdrawal> = t
        .store
        .run_transaction(|tx| tx.active_withdrawal(&referrer.id))
        .unwrap();
    assert_eq!(active.map(|w| w.id), Some(withdrawal.id));
    assert_eq!(load_profile(&t, &referrer.id).balance.available, 0);
}

#[test]
fn test_file_database_survives_reopen() {
    let path = std::env::temp_dir().join(format!(
        "affilink-store-test-{}.db",
        std::process::id()
    ));
    let profile_id: ProfileId = {
        let store: Arc<SqliteStore> = Arc::new(SqliteStore::new_with_file(&path).unwrap());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(test_now()));
        let engine: AffiliateEngine<SqliteStore> = AffiliateEngine::new(Arc::clone(&store), clock);
        engine
            .on_user_registered(&super::registration(
                affilink_domain::ProfileKind::Chatter,
                "earner@example.com",
                None,
            ))
            .unwrap()
            .profile_id
    };

    let reopened: SqliteStore = SqliteStore::new_with_file(&path).unwrap();
    let profile: Option<AffiliateProfile> = reopened
        .run_transaction(|tx| tx.profile(&profile_id))
        .unwrap();
    let config: Option<AffiliateConfig> = reopened.run_transaction(|tx| tx.config()).unwrap();
    drop(reopened);
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }

    assert_eq!(profile.map(|p| p.email), Some(String::from("earner@example.com")));
    assert_eq!(config.map(|c| c.version), Some(1));
}
