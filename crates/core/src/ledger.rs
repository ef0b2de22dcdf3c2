// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The commission ledger.
//!
//! Every balance mutation in the engine happens here, inside the same
//! transaction as the status write (or insert) of the commission that
//! caused it. Other components reach the balance only through the
//! crate-internal helpers at the bottom of this module.

use crate::audit_log::{record_audit_event, snapshot};
use crate::context::EngineContext;
use crate::error::{CoreError, StoreError};
use crate::store::{LedgerStore, LedgerTx};
use affilink_audit::{Actor, EntityRef};
use affilink_domain::{
    AffiliateConfig, AffiliateProfile, Balance, BalanceDelta, BaseAmounts, CalculatedAmount,
    CalculationError, CapturedRates, Cents, Commission, CommissionId, CommissionRule,
    CommissionStatus, CommissionType, ConditionUsage, DomainError, EvaluationContext,
    HoldSchedule, ProfileId, SourceKey, Withdrawal, calculate, evaluate_conditions, month_start,
};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info};

/// Everything needed to create one commission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionInput {
    pub referrer_id: ProfileId,
    pub referee_id: ProfileId,
    pub commission_type: CommissionType,
    /// Identifier of the triggering event (call id, subscription id, ...).
    pub source_id: String,
    pub bases: BaseAmounts,
    pub context: EvaluationContext,
    /// Replaces the configured rule; captured rates are ignored when set.
    pub rule_override: Option<CommissionRule>,
    pub description: Option<String>,
}

impl CommissionInput {
    #[must_use]
    pub fn new(
        referrer_id: ProfileId,
        referee_id: ProfileId,
        commission_type: CommissionType,
        source_id: &str,
    ) -> Self {
        Self {
            referrer_id,
            referee_id,
            commission_type,
            source_id: source_id.to_string(),
            bases: BaseAmounts::default(),
            context: EvaluationContext::default(),
            rule_override: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_bases(mut self, bases: BaseAmounts) -> Self {
        self.bases = bases;
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: EvaluationContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_rule(mut self, rule: CommissionRule) -> Self {
        self.rule_override = Some(rule);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Outcome of `create_commission`. Only `Created` writes anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommissionCreationResult {
    Created {
        commission_id: CommissionId,
        amount: Cents,
        status: CommissionStatus,
    },
    /// A commission with the same source key already exists.
    Duplicate { existing_id: CommissionId },
    /// A rule condition failed, or no enabled rule applies.
    RuleNotMet { reason: String },
    /// The computed amount was zero or negative.
    ZeroAmount,
    SystemInactive,
    /// The referrer is suspended or banned.
    ReferrerInactive,
}

impl CommissionCreationResult {
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }

    /// Short machine-readable label for logs and reports.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Duplicate { .. } => "duplicate",
            Self::RuleNotMet { .. } => "rule_not_met",
            Self::ZeroAmount => "zero_amount",
            Self::SystemInactive => "system_inactive",
            Self::ReferrerInactive => "referrer_inactive",
        }
    }
}

/// Outcome of a single-commission status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Advanced {
        from: CommissionStatus,
        to: CommissionStatus,
    },
    /// The commission had already left the expected status. Nothing changed.
    AlreadyAdvanced { status: CommissionStatus },
    /// The commission is in the expected status but not due yet.
    NotDue,
}

/// Transactional operations over commissions and balances.
pub struct CommissionLedger<S> {
    ctx: EngineContext<S>,
}

impl<S> Clone for CommissionLedger<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<S: LedgerStore> CommissionLedger<S> {
    #[must_use]
    pub const fn new(ctx: EngineContext<S>) -> Self {
        Self { ctx }
    }

    /// Creates a commission if every rule allows it.
    ///
    /// # Arguments
    ///
    /// * `input` - The referrer, referee, type, source and event facts
    ///
    /// # Returns
    ///
    /// A `CommissionCreationResult`; business refusals are not errors.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the referrer or referee does not
    /// exist, or an error if the store fails.
    pub fn create_commission(
        &self,
        input: &CommissionInput,
    ) -> Result<CommissionCreationResult, CoreError> {
        if input.source_id.trim().is_empty() {
            return Err(CoreError::InvalidArgument(String::from(
                "source id is required",
            )));
        }
        let config: Arc<AffiliateConfig> = self.ctx.config.get_config()?;
        if !config.is_system_active {
            debug!(
                commission_type = input.commission_type.as_str(),
                "Commission system is inactive"
            );
            return Ok(CommissionCreationResult::SystemInactive);
        }
        let now: OffsetDateTime = self.ctx.now();
        let key: SourceKey = SourceKey::new(
            input.referrer_id.clone(),
            input.referee_id.clone(),
            input.commission_type,
            &input.source_id,
        );

        let result: CommissionCreationResult =
            self.ctx
                .store
                .run_transaction(|tx| -> Result<_, CoreError> {
                    create_in_tx(tx, input, &key, &config, now)
                })?;

        match &result {
            CommissionCreationResult::Created {
                commission_id,
                amount,
                status,
            } => info!(
                commission_id = %commission_id,
                referrer_id = %input.referrer_id,
                commission_type = input.commission_type.as_str(),
                amount,
                status = status.as_str(),
                "Created commission"
            ),
            other => debug!(
                referrer_id = %input.referrer_id,
                commission_type = input.commission_type.as_str(),
                outcome = other.label(),
                "Commission not created"
            ),
        }
        Ok(result)
    }

    /// Moves a pending commission past its hold period.
    ///
    /// Safe to call repeatedly: the status is re-read inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` for an unknown id, or a store error.
    pub fn validate_commission(&self, id: &CommissionId) -> Result<TransitionOutcome, CoreError> {
        let now: OffsetDateTime = self.ctx.now();
        self.transition(id, CommissionStatus::Pending, now, |commission| {
            if commission.is_due_for_validation(now) {
                commission.validate(now).map(Some)
            } else {
                Ok(None)
            }
        })
    }

    /// Moves a validated commission to available.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` for an unknown id, or a store error.
    pub fn release_commission(&self, id: &CommissionId) -> Result<TransitionOutcome, CoreError> {
        let now: OffsetDateTime = self.ctx.now();
        self.transition(id, CommissionStatus::Validated, now, |commission| {
            if commission.is_due_for_release(now) {
                commission.release(now).map(Some)
            } else {
                Ok(None)
            }
        })
    }

    fn transition<F>(
        &self,
        id: &CommissionId,
        expected: CommissionStatus,
        now: OffsetDateTime,
        advance: F,
    ) -> Result<TransitionOutcome, CoreError>
    where
        F: Fn(&mut Commission) -> Result<Option<BalanceDelta>, DomainError>,
    {
        let outcome: TransitionOutcome =
            self.ctx
                .store
                .run_transaction(|tx| -> Result<_, CoreError> {
                    let mut commission: Commission = load_commission(tx, id)?;
                    if commission.status != expected {
                        return Ok(TransitionOutcome::AlreadyAdvanced {
                            status: commission.status,
                        });
                    }
                    let Some(delta) = advance(&mut commission)? else {
                        return Ok(TransitionOutcome::NotDue);
                    };
                    apply_balance_delta(tx, &commission.referrer_id, &delta)?;
                    tx.put_commission(&commission)?;
                    Ok(TransitionOutcome::Advanced {
                        from: expected,
                        to: commission.status,
                    })
                })?;
        if let TransitionOutcome::Advanced { from, to } = outcome {
            info!(
                commission_id = %id,
                from = from.as_str(),
                to = to.as_str(),
                at = %now,
                "Advanced commission"
            );
        }
        Ok(outcome)
    }

    /// Cancels a commission that has not been paid.
    ///
    /// The amount leaves whichever bucket holds it; `total_earned` is kept.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidArgument` for an empty reason,
    /// `CoreError::NotFound` for an unknown id, or a domain error if the
    /// commission is already paid or cancelled.
    pub fn cancel_commission(
        &self,
        id: &CommissionId,
        actor: &Actor,
        reason: &str,
    ) -> Result<Commission, CoreError> {
        require_reason(reason)?;
        let now: OffsetDateTime = self.ctx.now();
        let cancelled: Commission =
            self.ctx
                .store
                .run_transaction(|tx| -> Result<_, CoreError> {
                    let mut commission: Commission = load_commission(tx, id)?;
                    let before = snapshot(&commission);
                    let delta: BalanceDelta = commission.cancel(&actor.id, reason, now)?;
                    let mut referrer: AffiliateProfile =
                        apply_balance_delta(tx, &commission.referrer_id, &delta)?;
                    referrer
                        .stats
                        .record_cancelled(commission.commission_type, commission.amount);
                    tx.put_profile(&referrer)?;
                    tx.put_commission(&commission)?;
                    record_audit_event(
                        tx,
                        EntityRef::new("commission", id.as_str()),
                        actor,
                        reason,
                        "CancelCommission",
                        None,
                        before,
                        snapshot(&commission),
                        now,
                    )?;
                    Ok(commission)
                })?;
        info!(
            commission_id = %id,
            actor = %actor.id,
            amount = cancelled.amount,
            "Cancelled commission"
        );
        Ok(cancelled)
    }

    /// Changes the amount of a commission that has not been paid or cancelled.
    ///
    /// The signed difference is applied to the holding bucket, to
    /// `total_earned` and to the per-type stats.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidArgument` for an empty reason or negative
    /// amount, `CoreError::NotFound` for an unknown id, or a domain error if
    /// the commission is paid or cancelled.
    pub fn adjust_commission_amount(
        &self,
        id: &CommissionId,
        new_amount: Cents,
        actor: &Actor,
        reason: &str,
    ) -> Result<Commission, CoreError> {
        require_reason(reason)?;
        if new_amount < 0 {
            return Err(CoreError::InvalidArgument(String::from(
                "amount cannot be negative",
            )));
        }
        let now: OffsetDateTime = self.ctx.now();
        let adjusted: Commission =
            self.ctx
                .store
                .run_transaction(|tx| -> Result<_, CoreError> {
                    let mut commission: Commission = load_commission(tx, id)?;
                    let before = snapshot(&commission);
                    let previous: Cents = commission.amount;
                    let (delta, change) = commission.adjust(new_amount, &actor.id, reason, now)?;
                    let mut referrer: AffiliateProfile =
                        apply_balance_delta(tx, &commission.referrer_id, &delta)?;
                    referrer
                        .stats
                        .record_adjusted(commission.commission_type, change);
                    tx.put_profile(&referrer)?;
                    tx.put_commission(&commission)?;
                    record_audit_event(
                        tx,
                        EntityRef::new("commission", id.as_str()),
                        actor,
                        reason,
                        "AdjustCommission",
                        Some(format!("{previous} -> {new_amount}")),
                        before,
                        snapshot(&commission),
                        now,
                    )?;
                    Ok(commission)
                })?;
        info!(
            commission_id = %id,
            actor = %actor.id,
            amount = adjusted.amount,
            "Adjusted commission amount"
        );
        Ok(adjusted)
    }

    /// # Errors
    ///
    /// Returns `CoreError::NotFound` for an unknown id, or a store error.
    pub fn commission(&self, id: &CommissionId) -> Result<Commission, CoreError> {
        self.ctx
            .store
            .run_transaction(|tx| -> Result<_, CoreError> { load_commission(tx, id) })
    }

    /// All commissions credited to a referrer, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn commissions_for(&self, referrer: &ProfileId) -> Result<Vec<Commission>, CoreError> {
        Ok(self
            .ctx
            .store
            .run_transaction(|tx| tx.commissions_for_referrer(referrer))?)
    }

    /// # Errors
    ///
    /// Returns `CoreError::NotFound` for an unknown profile, or a store error.
    pub fn balance_of(&self, referrer: &ProfileId) -> Result<Balance, CoreError> {
        self.ctx
            .store
            .run_transaction(|tx| -> Result<_, CoreError> {
                Ok(load_profile(tx, referrer)?.balance)
            })
    }

    /// Reserves the commissions listed on a new withdrawal.
    ///
    /// Each commission moves `available -> paid` and the `available` bucket
    /// is debited by exactly the reserved sum, which is returned.
    pub(crate) fn reserve_for_withdrawal(
        tx: &mut dyn LedgerTx,
        withdrawal: &Withdrawal,
        now: OffsetDateTime,
    ) -> Result<Cents, CoreError> {
        let mut total = BalanceDelta::default();
        let mut reserved: Cents = 0;
        for id in &withdrawal.commission_ids {
            let mut commission: Commission = load_commission(tx, id)?;
            if commission.referrer_id != withdrawal.referrer_id {
                return Err(StoreError::Rejected(format!(
                    "commission {id} does not belong to {}",
                    withdrawal.referrer_id
                ))
                .into());
            }
            let delta: BalanceDelta = commission.reserve(&withdrawal.id, now)?;
            total.combine(&delta)?;
            reserved = checked_add(reserved, commission.amount)?;
            tx.put_commission(&commission)?;
        }
        apply_balance_delta(tx, &withdrawal.referrer_id, &total)?;
        Ok(reserved)
    }

    /// Returns the commissions reserved by a withdrawal to `available`.
    pub(crate) fn unreserve_withdrawal(
        tx: &mut dyn LedgerTx,
        withdrawal: &Withdrawal,
    ) -> Result<Cents, CoreError> {
        let mut total = BalanceDelta::default();
        let mut released: Cents = 0;
        for id in &withdrawal.commission_ids {
            let mut commission: Commission = load_commission(tx, id)?;
            let delta: BalanceDelta = commission.release_reservation(&withdrawal.id)?;
            total.combine(&delta)?;
            released = checked_add(released, commission.amount)?;
            tx.put_commission(&commission)?;
        }
        apply_balance_delta(tx, &withdrawal.referrer_id, &total)?;
        Ok(released)
    }

    /// Records a completed payout in the referrer's lifetime withdrawn total.
    pub(crate) fn settle_withdrawal(
        tx: &mut dyn LedgerTx,
        withdrawal: &Withdrawal,
    ) -> Result<(), CoreError> {
        apply_balance_delta(
            tx,
            &withdrawal.referrer_id,
            &BalanceDelta::withdrawn(withdrawal.amount),
        )?;
        Ok(())
    }
}

fn create_in_tx(
    tx: &mut dyn LedgerTx,
    input: &CommissionInput,
    key: &SourceKey,
    config: &AffiliateConfig,
    now: OffsetDateTime,
) -> Result<CommissionCreationResult, CoreError> {
    let mut referrer: AffiliateProfile = load_profile(tx, &input.referrer_id)?;
    let referee: AffiliateProfile = load_profile(tx, &input.referee_id)?;
    if !referrer.is_active() {
        return Ok(CommissionCreationResult::ReferrerInactive);
    }
    if let Some(existing) = tx.find_commission_by_source(key)? {
        return Ok(CommissionCreationResult::Duplicate {
            existing_id: existing.id,
        });
    }

    let (rule, captured): (CommissionRule, Option<&CapturedRates>) = match &input.rule_override {
        Some(rule) => (rule.clone(), None),
        None => match config.rule(input.commission_type) {
            Some(rule) => (rule.clone(), referrer.captured_rates.as_ref()),
            None => {
                return Ok(CommissionCreationResult::RuleNotMet {
                    reason: format!("no rule for {}", input.commission_type.as_str()),
                });
            }
        },
    };
    if !rule.enabled {
        return Ok(CommissionCreationResult::RuleNotMet {
            reason: String::from("rule is disabled"),
        });
    }

    let usage: ConditionUsage = ConditionUsage {
        this_month: if rule.conditions.max_per_month.is_some() {
            tx.count_commissions(
                &input.referrer_id,
                input.commission_type,
                None,
                Some(month_start(now)),
            )?
        } else {
            0
        },
        lifetime: if rule.conditions.lifetime_limit.is_some() {
            tx.count_commissions(
                &input.referrer_id,
                input.commission_type,
                Some(&input.referee_id),
                None,
            )?
        } else {
            0
        },
    };
    if let Err(reason) =
        evaluate_conditions(&rule.conditions, &input.context, referee.email_verified, usage)
    {
        return Ok(CommissionCreationResult::RuleNotMet { reason });
    }

    let calculated: CalculatedAmount = match calculate(
        &rule,
        input.commission_type,
        &input.bases,
        captured,
        &config.default_currency,
    ) {
        Ok(calculated) => calculated,
        Err(CalculationError::Overflow) => {
            return Err(DomainError::ArithmeticOverflow {
                operation: String::from("calculating commission amount"),
            }
            .into());
        }
        Err(err) => {
            return Ok(CommissionCreationResult::RuleNotMet {
                reason: err.to_string(),
            });
        }
    };
    if calculated.amount <= 0 {
        return Ok(CommissionCreationResult::ZeroAmount);
    }

    let schedule: HoldSchedule =
        HoldSchedule::compute(now, config.hold_period_hours, config.release_delay_hours)?;
    let commission: Commission = Commission {
        id: CommissionId::generate(now),
        referrer_id: input.referrer_id.clone(),
        referrer_kind: referrer.kind,
        referee_id: input.referee_id.clone(),
        commission_type: input.commission_type,
        source_type: input.commission_type.source_type(),
        source_id: input.source_id.clone(),
        dedupe_key: key.dedupe_key.clone(),
        amount: calculated.amount,
        currency: config.default_currency.clone(),
        calculation: calculated.details,
        status: schedule.status,
        description: input.description.clone().unwrap_or_else(|| {
            format!(
                "{} from {}",
                input.commission_type.as_str(),
                input.referee_id
            )
        }),
        created_at: now,
        hold_until: schedule.hold_until,
        available_at: schedule.available_at,
        validated_at: None,
        released_at: (schedule.status == CommissionStatus::Available).then_some(now),
        paid_at: None,
        cancelled_at: None,
        cancelled_by: None,
        cancellation_reason: None,
        withdrawal_id: None,
        adjustments: Vec::new(),
    };
    tx.insert_commission(&commission)?;

    referrer.balance.apply(&commission.creation_delta()?)?;
    referrer
        .stats
        .record_created(commission.commission_type, commission.amount);
    tx.put_profile(&referrer)?;

    if let Some(scheme) = commission.commission_type.referral_scheme()
        && let Some(mut edge) = tx.referral(&commission.referee_id, scheme)?
        && edge.referrer_id == commission.referrer_id
    {
        edge.total_commissions = checked_add(edge.total_commissions, commission.amount)?;
        tx.put_referral(&edge)?;
    }

    Ok(CommissionCreationResult::Created {
        commission_id: commission.id,
        amount: commission.amount,
        status: commission.status,
    })
}

pub(crate) fn load_commission(
    tx: &mut dyn LedgerTx,
    id: &CommissionId,
) -> Result<Commission, CoreError> {
    tx.commission(id)?
        .ok_or_else(|| CoreError::not_found("commission", id))
}

pub(crate) fn load_profile(
    tx: &mut dyn LedgerTx,
    id: &ProfileId,
) -> Result<AffiliateProfile, CoreError> {
    tx.profile(id)?
        .ok_or_else(|| CoreError::not_found("profile", id))
}

/// Applies a delta to a referrer's balance and writes the profile back.
///
/// Fails, aborting the caller's transaction, if any bucket would go negative.
pub(crate) fn apply_balance_delta(
    tx: &mut dyn LedgerTx,
    referrer_id: &ProfileId,
    delta: &BalanceDelta,
) -> Result<AffiliateProfile, CoreError> {
    let mut referrer: AffiliateProfile = load_profile(tx, referrer_id)?;
    if !delta.is_zero() {
        referrer.balance.apply(delta)?;
        tx.put_profile(&referrer)?;
    }
    Ok(referrer)
}

fn checked_add(a: Cents, b: Cents) -> Result<Cents, DomainError> {
    a.checked_add(b)
        .ok_or_else(|| DomainError::ArithmeticOverflow {
            operation: String::from("summing commission amounts"),
        })
}

fn require_reason(reason: &str) -> Result<(), CoreError> {
    if reason.trim().is_empty() {
        return Err(CoreError::InvalidArgument(String::from(
            "a reason is required",
        )));
    }
    Ok(())
}
