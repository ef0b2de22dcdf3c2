// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod store_tests;

use crate::SqliteStore;
use affilink::{
    AffiliateEngine, Clock, CommissionCreationResult, CommissionInput, LedgerStore, ManualClock,
    ProviderError, Quote, Registration, RegistrationOutcome, TransferProvider, TransferStatus,
};
use affilink_domain::{
    AffiliateProfile, Cents, CodeSlot, CommissionId, CommissionRule, CommissionType,
    PaymentDetails, PendingReferral, ProfileId, ProfileKind, SignupSignals,
};
use std::sync::Arc;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

pub fn test_now() -> OffsetDateTime {
    datetime!(2026-05-04 09:30 UTC)
}

/// An engine running on a fresh in-memory `SQLite` database.
pub struct SqliteEngine {
    pub store: Arc<SqliteStore>,
    pub clock: Arc<ManualClock>,
    pub engine: AffiliateEngine<SqliteStore>,
}

pub fn create_sqlite_engine() -> SqliteEngine {
    let store: Arc<SqliteStore> = Arc::new(SqliteStore::new_in_memory().expect("in-memory db"));
    let clock: Arc<ManualClock> = Arc::new(ManualClock::new(test_now()));
    let shared_clock: Arc<dyn Clock> = clock.clone();
    let engine: AffiliateEngine<SqliteStore> = AffiliateEngine::new(Arc::clone(&store), shared_clock);
    SqliteEngine {
        store,
        clock,
        engine,
    }
}

pub fn registration(kind: ProfileKind, email: &str, pending: Option<PendingReferral>) -> Registration {
    Registration {
        kind,
        email: email.to_string(),
        email_verified: true,
        display_name: String::from("Test User"),
        signals: SignupSignals::default(),
        pending_referral: pending,
    }
}

pub fn load_profile(t: &SqliteEngine, id: &ProfileId) -> AffiliateProfile {
    t.store
        .run_transaction(|tx| tx.profile(id))
        .unwrap()
        .expect("profile exists")
}

pub fn register_affiliate(t: &SqliteEngine, email: &str) -> AffiliateProfile {
    let outcome: RegistrationOutcome = t
        .engine
        .on_user_registered(&registration(ProfileKind::Chatter, email, None))
        .unwrap();
    load_profile(t, &outcome.profile_id)
}

pub fn register_client_of(t: &SqliteEngine, referrer: &AffiliateProfile, email: &str) -> ProfileId {
    let pending: PendingReferral = PendingReferral {
        code: referrer.code(CodeSlot::Generic).expect("generic code").to_string(),
        captured_at: Some(t.clock.now() - Duration::hours(1)),
    };
    t.engine
        .on_user_registered(&registration(ProfileKind::Client, email, Some(pending)))
        .unwrap()
        .profile_id
}

/// Creates a fixed-amount manual credit and returns its id.
pub fn credit(t: &SqliteEngine, referrer: &ProfileId, referee: &ProfileId, source: &str, amount: Cents) -> CommissionId {
    let input: CommissionInput = CommissionInput::new(
        referrer.clone(),
        referee.clone(),
        CommissionType::Manual,
        source,
    )
    .with_rule(CommissionRule::fixed(amount));
    match t.engine.ledger().create_commission(&input).unwrap() {
        CommissionCreationResult::Created { commission_id, .. } => commission_id,
        other => panic!("expected a created commission, got {other:?}"),
    }
}

pub fn create_test_payment_details() -> PaymentDetails {
    PaymentDetails {
        account_holder: String::from("Jane Doe"),
        iban: String::from("DE89 3704 0044 0532 0130 00"),
        bic: Some(String::from("COBADEFFXXX")),
        country: String::from("DE"),
        currency: String::from("EUR"),
    }
}

/// A provider that is never reachable.
pub struct OfflineProvider;

impl TransferProvider for OfflineProvider {
    async fn create_recipient(&self, _details: &PaymentDetails) -> Result<String, ProviderError> {
        Err(ProviderError::transient("offline"))
    }

    async fn create_quote(
        &self,
        _amount: Cents,
        _source_currency: &str,
        _target_currency: &str,
    ) -> Result<Quote, ProviderError> {
        Err(ProviderError::transient("offline"))
    }

    async fn create_transfer(
        &self,
        _recipient_id: &str,
        _quote_id: &str,
        _idempotency_key: &str,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::transient("offline"))
    }

    async fn fund_transfer(&self, _transfer_id: &str) -> Result<TransferStatus, ProviderError> {
        Err(ProviderError::transient("offline"))
    }

    async fn get_transfer(&self, _transfer_id: &str) -> Result<TransferStatus, ProviderError> {
        Err(ProviderError::transient("offline"))
    }
}
