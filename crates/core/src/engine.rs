// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The two inbound entry points of the engine: a user registered, and a
//! referred user completed a paid action.

use crate::attribution::{AttributionDecision, AttributionRejection, AttributionResolver};
use crate::clock::Clock;
use crate::context::EngineContext;
use crate::error::{CoreError, StoreError};
use crate::fraud_gate::{FraudGate, FraudScorer, GateOutcome, RuleBasedScorer};
use crate::graph::{LegOutcome, ReferralGraph};
use crate::ledger::{CommissionCreationResult, CommissionInput, CommissionLedger, load_profile};
use crate::payout::{PayoutOrchestrator, TransferProvider};
use crate::rates::ensure_captured;
use crate::reconciler::Reconciler;
use crate::store::LedgerStore;
use affilink_domain::{
    AffiliateConfig, AffiliateProfile, AffiliateStats, Balance, BaseAmounts, CommissionType,
    EvaluationContext, FraudDecision, FraudStatus, PendingReferral, ProfileId, ProfileKind,
    ProfileStatus, Referral, ReferralCode, ReferralScheme, SignupSignals, generate_codes,
    subscription_month_index, validate_display_name, validate_email,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use time::{Date, OffsetDateTime};
use tracing::{info, warn};

/// Attempts at drawing a fresh set of referral codes on collision.
const CODE_GENERATION_ATTEMPTS: u32 = 3;

/// A new user as reported by the identity system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub kind: ProfileKind,
    pub email: String,
    pub email_verified: bool,
    pub display_name: String,
    pub signals: SignupSignals,
    /// The referral code captured before signup, if any.
    pub pending_referral: Option<PendingReferral>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributionStatus {
    NoReferral,
    NotAttributed(AttributionRejection),
    Attributed {
        referrer_id: ProfileId,
        scheme: ReferralScheme,
        flagged_for_review: bool,
    },
    /// The fraud gate blocked the referral. No edge was created.
    Blocked { referrer_id: ProfileId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOutcome {
    pub profile_id: ProfileId,
    pub codes: Vec<ReferralCode>,
    pub attribution: AttributionStatus,
    /// Present only for attributed client signups.
    pub signup_commission: Option<Result<CommissionCreationResult, CoreError>>,
}

/// The paid actions that can earn a referrer a commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferredAction {
    /// A referred client finished a call.
    CallCompleted,
    /// A recruited provider received a call.
    ProviderCallReceived,
    SubscriptionCreated,
    SubscriptionRenewed,
}

/// Dates needed to number a subscription month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionPeriod {
    pub started_on: Date,
    pub period_start: Date,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEvent {
    pub action: ReferredAction,
    pub referrer_id: ProfileId,
    pub referee_id: ProfileId,
    /// Call id or subscription period id.
    pub source_id: String,
    pub bases: BaseAmounts,
    pub context: EvaluationContext,
    pub subscription: Option<SubscriptionPeriod>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub direct: LegOutcome,
    /// N1 and N2 call commissions.
    pub network: Vec<LegOutcome>,
    pub thresholds: Vec<LegOutcome>,
}

/// Wires every component over one store and clock.
pub struct AffiliateEngine<S> {
    ctx: EngineContext<S>,
    ledger: CommissionLedger<S>,
    resolver: AttributionResolver<S>,
    gate: FraudGate<S>,
    graph: ReferralGraph<S>,
    reconciler: Reconciler<S>,
}

impl<S: LedgerStore> AffiliateEngine<S> {
    /// Builds an engine with the rule-based fraud scorer.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self::with_scorer(EngineContext::new(store, clock), Arc::new(RuleBasedScorer))
    }

    #[must_use]
    pub fn with_scorer(ctx: EngineContext<S>, scorer: Arc<dyn FraudScorer>) -> Self {
        let ledger: CommissionLedger<S> = CommissionLedger::new(ctx.clone());
        Self {
            resolver: AttributionResolver::new(ctx.clone()),
            gate: FraudGate::new(ctx.clone(), scorer),
            graph: ReferralGraph::new(ctx.clone(), ledger.clone()),
            reconciler: Reconciler::new(ctx.clone(), crate::reconciler::DEFAULT_PAGE_SIZE),
            ledger,
            ctx,
        }
    }

    #[must_use]
    pub const fn context(&self) -> &EngineContext<S> {
        &self.ctx
    }

    #[must_use]
    pub const fn ledger(&self) -> &CommissionLedger<S> {
        &self.ledger
    }

    #[must_use]
    pub const fn resolver(&self) -> &AttributionResolver<S> {
        &self.resolver
    }

    #[must_use]
    pub const fn fraud_gate(&self) -> &FraudGate<S> {
        &self.gate
    }

    #[must_use]
    pub const fn graph(&self) -> &ReferralGraph<S> {
        &self.graph
    }

    #[must_use]
    pub const fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    /// Builds a payout orchestrator sharing this engine's store and clock.
    #[must_use]
    pub fn payouts<P: TransferProvider>(&self, provider: Arc<P>) -> PayoutOrchestrator<S, P> {
        PayoutOrchestrator::new(self.ctx.clone(), provider)
    }

    /// Handles a new user.
    ///
    /// The profile is always created. Attribution, the fraud gate and the
    /// signup commission only decide what else happens.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a bad email or display name, or a store
    /// error if the profile or edge cannot be written.
    pub fn on_user_registered(
        &self,
        registration: &Registration,
    ) -> Result<RegistrationOutcome, CoreError> {
        validate_email(&registration.email)
            .and_then(|()| validate_display_name(&registration.display_name))
            .map_err(|err| CoreError::InvalidArgument(err.to_string()))?;
        let config: Arc<AffiliateConfig> = self.ctx.config.get_config()?;

        let mut profile: AffiliateProfile = self.create_profile(registration, &config)?;
        info!(
            profile_id = %profile.id,
            kind = profile.kind.as_str(),
            "Registered profile"
        );

        let Some(pending) = &registration.pending_referral else {
            return Ok(RegistrationOutcome {
                profile_id: profile.id.clone(),
                codes: profile.codes,
                attribution: AttributionStatus::NoReferral,
                signup_commission: None,
            });
        };

        let (code, captured_at, expires_at) = match self.resolver.attribute(pending, &profile)? {
            AttributionDecision::Attributed {
                code,
                captured_at,
                expires_at,
            } => (code, captured_at, expires_at),
            AttributionDecision::NotAttributed(rejection) => {
                return Ok(RegistrationOutcome {
                    profile_id: profile.id.clone(),
                    codes: profile.codes,
                    attribution: AttributionStatus::NotAttributed(rejection),
                    signup_commission: None,
                });
            }
        };

        let referrer: AffiliateProfile = self
            .ctx
            .store
            .run_transaction(|tx| -> Result<_, CoreError> {
                load_profile(tx, &code.referrer_id)
            })?;
        let gate: GateOutcome = self.gate.check_signup(&profile, &referrer)?;
        let now: OffsetDateTime = self.ctx.now();

        if gate.decision == FraudDecision::Block {
            profile = self
                .ctx
                .store
                .run_transaction(|tx| -> Result<_, CoreError> {
                    let mut stored: AffiliateProfile = load_profile(tx, &profile.id)?;
                    stored.fraud_status = FraudStatus::UnderReview;
                    tx.put_profile(&stored)?;
                    Ok(stored)
                })?;
            return Ok(RegistrationOutcome {
                profile_id: profile.id.clone(),
                codes: profile.codes,
                attribution: AttributionStatus::Blocked {
                    referrer_id: referrer.id,
                },
                signup_commission: None,
            });
        }

        let flagged_for_review: bool = gate.decision == FraudDecision::Review;
        let scheme: ReferralScheme = ReferralScheme::for_referee(profile.kind);
        let edge: Referral = Referral {
            referee_id: profile.id.clone(),
            referrer_id: referrer.id.clone(),
            scheme,
            code_used: code.code.clone(),
            code_slot: code.slot,
            captured_at,
            attributed_at: now,
            attribution_expires_at: expires_at,
            total_commissions: 0,
            first_threshold_at: None,
            second_threshold_at: None,
            n2_unlocked: false,
            fraud_review: flagged_for_review,
        };
        self.ctx
            .store
            .run_transaction(|tx| -> Result<_, CoreError> {
                tx.put_referral(&edge)?;
                if scheme == ReferralScheme::AffiliateRecruitment {
                    let mut stored: AffiliateProfile = load_profile(tx, &edge.referee_id)?;
                    stored.referred_by = Some(edge.referrer_id.clone());
                    tx.put_profile(&stored)?;
                }
                Ok(())
            })?;
        info!(
            referee_id = %edge.referee_id,
            referrer_id = %edge.referrer_id,
            scheme = scheme.as_str(),
            slot = code.slot.as_str(),
            flagged_for_review,
            "Attributed referral"
        );

        let signup_commission = (scheme == ReferralScheme::Client).then(|| {
            let input: CommissionInput = CommissionInput::new(
                referrer.id.clone(),
                profile.id.clone(),
                CommissionType::Signup,
                profile.id.as_str(),
            );
            let result = self.ledger.create_commission(&input);
            if let Err(err) = &result {
                warn!(referee_id = %profile.id, error = %err, "Signup commission failed");
            }
            result
        });

        Ok(RegistrationOutcome {
            profile_id: profile.id.clone(),
            codes: profile.codes,
            attribution: AttributionStatus::Attributed {
                referrer_id: referrer.id,
                scheme,
                flagged_for_review,
            },
            signup_commission,
        })
    }

    fn create_profile(
        &self,
        registration: &Registration,
        config: &AffiliateConfig,
    ) -> Result<AffiliateProfile, CoreError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let now: OffsetDateTime = self.ctx.now();
            let mut profile: AffiliateProfile = AffiliateProfile {
                id: ProfileId::generate(now),
                kind: registration.kind,
                status: ProfileStatus::Active,
                email: registration.email.trim().to_string(),
                email_verified: registration.email_verified,
                display_name: registration.display_name.trim().to_string(),
                codes: generate_codes(registration.kind),
                captured_rates: None,
                balance: Balance::default(),
                stats: AffiliateStats::default(),
                referred_by: None,
                paid_tier_milestones: BTreeSet::new(),
                signup: registration.signals.clone(),
                payout_recipient: None,
                fraud_status: FraudStatus::Clear,
                created_at: now,
            };
            ensure_captured(&mut profile, config, now);

            match self
                .ctx
                .store
                .run_transaction(|tx| tx.insert_profile(&profile))
            {
                Ok(()) => return Ok(profile),
                Err(StoreError::Duplicate { entity, key }) if attempt < CODE_GENERATION_ATTEMPTS => {
                    warn!(entity = %entity, key = %key, attempt, "Referral code collision, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Handles a completed paid action of a referred user.
    ///
    /// The direct commission, the network commissions and the threshold
    /// checks run as separate transactions. A failing leg is logged and
    /// reported without undoing the others.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for malformed events, before anything is
    /// written.
    pub fn on_referred_action_completed(
        &self,
        event: &ActionEvent,
    ) -> Result<ActionOutcome, CoreError> {
        validate_event(event)?;
        let mut context: EvaluationContext = event.context.clone();
        if let Some(period) = event.subscription {
            let month: Option<u32> =
                subscription_month_index(period.started_on, period.period_start)?;
            context.subscription_month = month;
        }
        if event.action == ReferredAction::SubscriptionCreated {
            context.subscription_month = context.subscription_month.or(Some(1));
        }

        let direct: LegOutcome = match event.action {
            ReferredAction::CallCompleted => self.call_commission(event, &context),
            ReferredAction::ProviderCallReceived => {
                self.direct_leg(event, CommissionType::ProviderCall, &context)
            }
            ReferredAction::SubscriptionCreated => {
                self.direct_leg(event, CommissionType::Subscription, &context)
            }
            ReferredAction::SubscriptionRenewed => {
                self.direct_leg(event, CommissionType::SubscriptionRenewal, &context)
            }
        };
        if direct.result.is_err() {
            return Ok(ActionOutcome {
                direct,
                network: Vec::new(),
                thresholds: Vec::new(),
            });
        }

        let network: Vec<LegOutcome> = if matches!(
            event.action,
            ReferredAction::CallCompleted | ReferredAction::ProviderCallReceived
        ) {
            self.graph
                .network_commissions(&event.referrer_id, &event.source_id, &context)
                .unwrap_or_else(|err| {
                    warn!(referrer_id = %event.referrer_id, error = %err, "Network commissions skipped");
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        let thresholds: Vec<LegOutcome> = if matches!(
            direct.result,
            Ok(CommissionCreationResult::Created { .. })
        ) {
            self.graph
                .check_thresholds(&event.referrer_id)
                .unwrap_or_else(|err| {
                    warn!(referrer_id = %event.referrer_id, error = %err, "Threshold check skipped");
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        Ok(ActionOutcome {
            direct,
            network,
            thresholds,
        })
    }

    /// A client call pays `referral_first_call` once per client, then
    /// `referral_recurring_call` for every later call.
    ///
    /// A redelivered first call is recognized by its call id and reported
    /// as the duplicate it is.
    fn call_commission(&self, event: &ActionEvent, context: &EvaluationContext) -> LegOutcome {
        let first: LegOutcome = self.direct_leg(event, CommissionType::FirstCall, context);
        let Ok(CommissionCreationResult::Duplicate { existing_id }) = &first.result else {
            return first;
        };
        match self.ledger.commission(existing_id) {
            Ok(existing) if existing.source_id == event.source_id => first,
            Ok(_) => self.direct_leg(event, CommissionType::RecurringCall, context),
            Err(err) => LegOutcome {
                commission_type: CommissionType::FirstCall,
                referrer_id: event.referrer_id.clone(),
                result: Err(err),
            },
        }
    }

    fn direct_leg(
        &self,
        event: &ActionEvent,
        commission_type: CommissionType,
        context: &EvaluationContext,
    ) -> LegOutcome {
        let input: CommissionInput = CommissionInput::new(
            event.referrer_id.clone(),
            event.referee_id.clone(),
            commission_type,
            &event.source_id,
        )
        .with_bases(event.bases)
        .with_context(context.clone());
        let result = self.ledger.create_commission(&input);
        if let Err(err) = &result {
            warn!(
                referrer_id = %event.referrer_id,
                commission_type = commission_type.as_str(),
                error = %err,
                "Direct commission failed"
            );
        }
        LegOutcome {
            commission_type,
            referrer_id: event.referrer_id.clone(),
            result,
        }
    }
}

fn validate_event(event: &ActionEvent) -> Result<(), CoreError> {
    if event.source_id.trim().is_empty() {
        return Err(CoreError::InvalidArgument(String::from(
            "source id is required",
        )));
    }
    if event.referrer_id == event.referee_id {
        return Err(CoreError::InvalidArgument(String::from(
            "referrer and referee must differ",
        )));
    }
    let bases: [Option<i64>; 4] = [
        event.bases.connection_fee,
        event.bases.total_amount,
        event.bases.first_month,
        event.bases.annual_value,
    ];
    if bases.iter().flatten().any(|amount| *amount < 0) {
        return Err(CoreError::InvalidArgument(String::from(
            "amounts cannot be negative",
        )));
    }
    if event.action == ReferredAction::SubscriptionRenewed && event.subscription.is_none() {
        return Err(CoreError::InvalidArgument(String::from(
            "renewals need the subscription period",
        )));
    }
    if let Some(period) = event.subscription
        && period.period_start < period.started_on
    {
        return Err(CoreError::InvalidArgument(String::from(
            "period starts before the subscription",
        )));
    }
    Ok(())
}
