// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use crate::{
    ActionEvent, AffiliateEngine, AttributionStatus, Clock, CommissionInput, EngineContext,
    FraudScorer, InMemoryStore, LedgerStore, ManualClock, ProviderError, Quote, ReferredAction,
    Registration, RegistrationOutcome, TransferProvider, TransferStatus,
};
use affilink_audit::Actor;
use affilink_domain::{
    AffiliateProfile, BaseAmounts, Cents, CodeSlot, Commission, CommissionType, EvaluationContext,
    PaymentDetails, PendingReferral, ProfileId, ProfileKind, SignupSignals,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

pub fn test_now() -> OffsetDateTime {
    datetime!(2026-05-04 09:30 UTC)
}

/// An engine over an in-memory store with a hand-driven clock.
pub struct TestEngine {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub engine: AffiliateEngine<InMemoryStore>,
}

pub fn create_test_engine() -> TestEngine {
    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let clock: Arc<ManualClock> = Arc::new(ManualClock::new(test_now()));
    let shared_clock: Arc<dyn Clock> = clock.clone();
    let engine: AffiliateEngine<InMemoryStore> =
        AffiliateEngine::new(Arc::clone(&store), shared_clock);
    TestEngine {
        store,
        clock,
        engine,
    }
}

pub fn create_test_engine_with_scorer(scorer: Arc<dyn FraudScorer>) -> TestEngine {
    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let clock: Arc<ManualClock> = Arc::new(ManualClock::new(test_now()));
    let shared_clock: Arc<dyn Clock> = clock.clone();
    let engine: AffiliateEngine<InMemoryStore> =
        AffiliateEngine::with_scorer(EngineContext::new(Arc::clone(&store), shared_clock), scorer);
    TestEngine {
        store,
        clock,
        engine,
    }
}

pub fn create_test_admin() -> Actor {
    Actor::admin("admin-1")
}

pub fn registration(kind: ProfileKind, email: &str) -> Registration {
    Registration {
        kind,
        email: email.to_string(),
        email_verified: true,
        display_name: String::from("Test User"),
        signals: SignupSignals::default(),
        pending_referral: None,
    }
}

pub fn referred_registration(
    kind: ProfileKind,
    email: &str,
    code: &str,
    captured_at: Option<OffsetDateTime>,
) -> Registration {
    Registration {
        pending_referral: Some(PendingReferral {
            code: code.to_string(),
            captured_at,
        }),
        ..registration(kind, email)
    }
}

pub fn load_profile(t: &TestEngine, id: &ProfileId) -> AffiliateProfile {
    t.store
        .run_transaction(|tx| tx.profile(id))
        .unwrap()
        .expect("profile exists")
}

pub fn load_commission(t: &TestEngine, id: &affilink_domain::CommissionId) -> Commission {
    t.engine.ledger().commission(id).unwrap()
}

/// Registers an affiliate with the given email and no referral.
pub fn register_affiliate(t: &TestEngine, email: &str) -> AffiliateProfile {
    let outcome: RegistrationOutcome = t
        .engine
        .on_user_registered(&registration(ProfileKind::Chatter, email))
        .unwrap();
    load_profile(t, &outcome.profile_id)
}

/// Registers `kind` through `referrer`'s code captured an hour ago and
/// asserts the referral was attributed.
pub fn register_referred(
    t: &TestEngine,
    referrer: &AffiliateProfile,
    kind: ProfileKind,
    email: &str,
) -> ProfileId {
    let code: &str = referrer.code(CodeSlot::Generic).expect("generic code");
    let outcome: RegistrationOutcome = t
        .engine
        .on_user_registered(&referred_registration(
            kind,
            email,
            code,
            Some(t.clock.now() - Duration::hours(1)),
        ))
        .unwrap();
    assert!(
        matches!(outcome.attribution, AttributionStatus::Attributed { .. }),
        "expected attribution, got {:?}",
        outcome.attribution
    );
    outcome.profile_id
}

pub fn register_referred_client(t: &TestEngine, referrer: &AffiliateProfile, email: &str) -> ProfileId {
    register_referred(t, referrer, ProfileKind::Client, email)
}

pub fn call_event(
    referrer: &ProfileId,
    referee: &ProfileId,
    call_id: &str,
    duration_secs: u32,
) -> ActionEvent {
    ActionEvent {
        action: ReferredAction::CallCompleted,
        referrer_id: referrer.clone(),
        referee_id: referee.clone(),
        source_id: call_id.to_string(),
        bases: BaseAmounts {
            connection_fee: Some(2_500),
            ..BaseAmounts::default()
        },
        context: EvaluationContext {
            call_duration_secs: Some(duration_secs),
            ..EvaluationContext::default()
        },
        subscription: None,
    }
}

/// A fixed-amount manual credit, bypassing the configured rules.
pub fn manual_credit(referrer: &ProfileId, referee: &ProfileId, source: &str, amount: Cents) -> CommissionInput {
    CommissionInput::new(
        referrer.clone(),
        referee.clone(),
        CommissionType::Manual,
        source,
    )
    .with_rule(affilink_domain::CommissionRule::fixed(amount))
}

/// Moves the clock past hold and release delay and runs both passes.
pub fn make_everything_available(t: &TestEngine) {
    t.clock.advance(Duration::hours(97));
    t.engine.reconciler().validate_pass().unwrap();
    t.engine.reconciler().release_pass().unwrap();
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

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<&'static str>,
    failures: BTreeMap<&'static str, ProviderError>,
    hanging: Vec<&'static str>,
    fund_status: Option<TransferStatus>,
    poll_status: Option<TransferStatus>,
    transfers: BTreeMap<String, String>,
    recipients: u32,
}

/// A scriptable transfer provider.
#[derive(Debug, Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_at(&self, step: &'static str, error: ProviderError) {
        self.state.lock().unwrap().failures.insert(step, error);
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Makes `step` never answer.
    pub fn hang_at(&self, step: &'static str) {
        self.state.lock().unwrap().hanging.push(step);
    }

    pub fn set_fund_status(&self, status: TransferStatus) {
        self.state.lock().unwrap().fund_status = Some(status);
    }

    pub fn set_poll_status(&self, status: TransferStatus) {
        self.state.lock().unwrap().poll_status = Some(status);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, step: &str) -> usize {
        self.calls().iter().filter(|c| **c == step).count()
    }

    async fn enter(&self, step: &'static str) -> Result<(), ProviderError> {
        let (failure, hangs) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(step);
            (state.failures.get(step).cloned(), state.hanging.contains(&step))
        };
        if hangs {
            tokio::time::sleep(std::time::Duration::from_secs(3_600)).await;
        }
        failure.map_or(Ok(()), Err)
    }
}

impl TransferProvider for MockProvider {
    async fn create_recipient(&self, _details: &PaymentDetails) -> Result<String, ProviderError> {
        self.enter("create_recipient").await?;
        let mut state = self.state.lock().unwrap();
        state.recipients += 1;
        Ok(format!("rcp_{}", state.recipients))
    }

    async fn create_quote(
        &self,
        amount: Cents,
        source_currency: &str,
        target_currency: &str,
    ) -> Result<Quote, ProviderError> {
        self.enter("create_quote").await?;
        Ok(Quote {
            quote_id: format!("quo_{amount}"),
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
        idempotency_key: &str,
    ) -> Result<String, ProviderError> {
        self.enter("create_transfer").await?;
        let mut state = self.state.lock().unwrap();
        let next: String = format!("trf_{}", state.transfers.len() + 1);
        Ok(state
            .transfers
            .entry(idempotency_key.to_string())
            .or_insert(next)
            .clone())
    }

    async fn fund_transfer(&self, _transfer_id: &str) -> Result<TransferStatus, ProviderError> {
        self.enter("fund_transfer").await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .fund_status
            .unwrap_or(TransferStatus::Completed))
    }

    async fn get_transfer(&self, _transfer_id: &str) -> Result<TransferStatus, ProviderError> {
        self.enter("get_transfer").await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .poll_status
            .unwrap_or(TransferStatus::Processing))
    }
}
