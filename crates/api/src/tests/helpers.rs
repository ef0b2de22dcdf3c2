// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Test helper functions and fixtures.

use affilink::{
    AffiliateEngine, Clock, CommissionCreationResult, CommissionInput, InMemoryStore,
    LedgerStore, ManualClock, PayoutOrchestrator, ProviderError, Quote, Registration, TransferProvider,
    TransferStatus,
};
use affilink_domain::{
    Cents, CodeSlot, CommissionId, CommissionRule, CommissionType, PaymentDetails,
    PendingReferral, ProfileId, ProfileKind, SignupSignals,
};
use std::sync::Arc;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use crate::{AuthenticatedActor, RequestWithdrawalRequest, Role};

pub fn test_now() -> OffsetDateTime {
    datetime!(2026-05-04 09:30 UTC)
}

pub fn create_test_admin() -> AuthenticatedActor {
    AuthenticatedActor::new(String::from("admin-123"), Role::Admin)
}

pub fn create_test_affiliate(id: &ProfileId) -> AuthenticatedActor {
    AuthenticatedActor::new(id.as_str().to_string(), Role::Affiliate)
}

/// A transfer provider that either completes every transfer or refuses
/// every transfer at funding time.
pub struct StaticProvider {
    pub refuse_funding: bool,
}

impl TransferProvider for StaticProvider {
    async fn create_recipient(&self, _details: &PaymentDetails) -> Result<String, ProviderError> {
        Ok(String::from("rcp_1"))
    }

    async fn create_quote(
        &self,
        amount: Cents,
        source_currency: &str,
        target_currency: &str,
    ) -> Result<Quote, ProviderError> {
        Ok(Quote {
            quote_id: String::from("quo_1"),
            source_amount: amount,
            source_currency: source_currency.to_string(),
            target_amount: amount,
            target_currency: target_currency.to_string(),
        })
    }

    async fn create_transfer(
        &self,
        _recipient_id: &str,
        _quote_id: &str,
        _idempotency_key: &str,
    ) -> Result<String, ProviderError> {
        Ok(String::from("trf_1"))
    }

    async fn fund_transfer(&self, _transfer_id: &str) -> Result<TransferStatus, ProviderError> {
        if self.refuse_funding {
            Err(ProviderError::terminal("insufficient provider balance"))
        } else {
            Ok(TransferStatus::Completed)
        }
    }

    async fn get_transfer(&self, _transfer_id: &str) -> Result<TransferStatus, ProviderError> {
        Ok(TransferStatus::Completed)
    }
}

/// An engine with one affiliate, one referred client, and the given
/// manual credits already created.
pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub engine: AffiliateEngine<InMemoryStore>,
    pub referrer: ProfileId,
    pub client: ProfileId,
    pub commissions: Vec<CommissionId>,
}

impl Fixture {
    pub fn payouts(&self, refuse_funding: bool) -> PayoutOrchestrator<InMemoryStore, StaticProvider> {
        self.engine
            .payouts(Arc::new(StaticProvider { refuse_funding }))
    }

    /// Moves the clock past hold and release delay and reconciles.
    pub fn make_available(&self) {
        self.clock.advance(Duration::hours(97));
        self.engine.reconciler().validate_pass().unwrap();
        self.engine.reconciler().release_pass().unwrap();
    }
}

fn registration(kind: ProfileKind, email: &str, pending_referral: Option<PendingReferral>) -> Registration {
    Registration {
        kind,
        email: email.to_string(),
        email_verified: true,
        display_name: String::from("Test User"),
        signals: SignupSignals::default(),
        pending_referral,
    }
}

pub fn create_fixture(credits: &[Cents]) -> Fixture {
    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let clock: Arc<ManualClock> = Arc::new(ManualClock::new(test_now()));
    let shared_clock: Arc<dyn Clock> = clock.clone();
    let engine: AffiliateEngine<InMemoryStore> = AffiliateEngine::new(store, shared_clock);

    let referrer: ProfileId = engine
        .on_user_registered(&registration(ProfileKind::Chatter, "earner@example.com", None))
        .unwrap()
        .profile_id;
    let code: String = engine
        .context()
        .store
        .run_transaction(|tx| tx.profile(&referrer))
        .unwrap()
        .and_then(|p| p.code(CodeSlot::Generic).map(str::to_string))
        .expect("generic code");
    let client: ProfileId = engine
        .on_user_registered(&registration(
            ProfileKind::Client,
            "client@example.com",
            Some(PendingReferral {
                code,
                captured_at: Some(clock.now() - Duration::hours(1)),
            }),
        ))
        .unwrap()
        .profile_id;

    let mut commissions: Vec<CommissionId> = Vec::new();
    for (n, amount) in credits.iter().enumerate() {
        clock.advance(Duration::minutes(1));
        let input: CommissionInput = CommissionInput::new(
            referrer.clone(),
            client.clone(),
            CommissionType::Manual,
            &format!("credit-{n}"),
        )
        .with_rule(CommissionRule::fixed(*amount));
        match engine.ledger().create_commission(&input).unwrap() {
            CommissionCreationResult::Created { commission_id, .. } => {
                commissions.push(commission_id);
            }
            other => panic!("expected a created commission, got {other:?}"),
        }
    }

    Fixture {
        clock,
        engine,
        referrer,
        client,
        commissions,
    }
}

pub fn create_withdrawal_request(profile_id: &ProfileId, amount: Cents) -> RequestWithdrawalRequest {
    RequestWithdrawalRequest {
        profile_id: profile_id.as_str().to_string(),
        amount,
        account_holder: String::from("Jane Doe"),
        iban: String::from("DE89 3704 0044 0532 0130 00"),
        bic: Some(String::from("COBADEFFXXX")),
        country: String::from("de"),
        currency: String::from("eur"),
    }
}
