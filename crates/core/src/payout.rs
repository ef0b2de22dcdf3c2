// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Withdrawal requests and the external transfer saga.
//!
//! The saga runs recipient -> quote -> transfer -> fund -> observe against a
//! [`TransferProvider`]. Every provider call is bounded by the configured
//! timeout; a failed or timed out step marks the withdrawal `failed`. Funds
//! reserved for a failed withdrawal stay reserved until an administrator
//! releases them.

use crate::audit_log::{record_audit_event, snapshot};
use crate::context::EngineContext;
use crate::error::CoreError;
use crate::fraud_gate::{PayoutCheck, check_payout};
use crate::ledger::{CommissionLedger, load_profile};
use crate::store::{LedgerStore, LedgerTx, run_transaction_async};
use affilink_audit::{Actor, EntityRef};
use affilink_domain::{
    AffiliateConfig, AffiliateProfile, Cents, Commission, CommissionSelection, DomainError,
    FailureKind, PaymentDetails, PayoutRecipient, ProfileId, StatusChange, TransferFailure,
    TransferProgress, Withdrawal, WithdrawalId, WithdrawalStatus, month_start,
    select_commissions_fifo,
};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

/// Number of processing withdrawals refreshed concurrently by `poll_processing`.
const POLL_CONCURRENCY: usize = 4;

/// Status of an external transfer as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Created but not yet funded.
    Incoming,
    Processing,
    Completed,
    Cancelled,
    Refunded,
    Failed,
}

impl TransferStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Refunded | Self::Failed
        )
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// A priced conversion for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub quote_id: String,
    pub source_amount: Cents,
    pub source_currency: String,
    pub target_amount: Cents,
    pub target_currency: String,
}

/// An error reported by the transfer provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub kind: FailureKind,
    pub message: String,
}

impl ProviderError {
    #[must_use]
    pub fn transient(message: &str) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn terminal(message: &str) -> Self {
        Self {
            kind: FailureKind::Terminal,
            message: message.to_string(),
        }
    }
}

/// The five operations the saga needs from an external payout provider.
pub trait TransferProvider: Send + Sync {
    fn create_recipient(
        &self,
        details: &PaymentDetails,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;

    fn create_quote(
        &self,
        amount: Cents,
        source_currency: &str,
        target_currency: &str,
    ) -> impl Future<Output = Result<Quote, ProviderError>> + Send;

    /// Creates a transfer. Calls with the same `idempotency_key` must
    /// return the same transfer.
    fn create_transfer(
        &self,
        recipient_id: &str,
        quote_id: &str,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;

    fn fund_transfer(
        &self,
        transfer_id: &str,
    ) -> impl Future<Output = Result<TransferStatus, ProviderError>> + Send;

    fn get_transfer(
        &self,
        transfer_id: &str,
    ) -> impl Future<Output = Result<TransferStatus, ProviderError>> + Send;
}

/// Counters from one `poll_processing` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_processing: usize,
    /// Refreshes that returned an error.
    pub errors: usize,
}

pub struct PayoutOrchestrator<S, P> {
    ctx: EngineContext<S>,
    provider: Arc<P>,
}

impl<S: LedgerStore, P: TransferProvider> PayoutOrchestrator<S, P> {
    #[must_use]
    pub const fn new(ctx: EngineContext<S>, provider: Arc<P>) -> Self {
        Self { ctx, provider }
    }

    /// Creates a withdrawal and reserves the commissions backing it.
    ///
    /// The withdrawal amount is the FIFO-selected sum of available
    /// commissions that does not exceed the smallest of the requested
    /// amount, the available balance and the remaining monthly allowance.
    ///
    /// # Arguments
    ///
    /// * `referrer_id` - The requesting profile
    /// * `requested_amount` - Amount asked for, in minor units
    /// * `payment` - Where the money goes
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for bad input, `PermissionDenied` for
    /// inactive or blocked profiles, `FailedPrecondition` when a withdrawal
    /// is already active, the minimum is not met, a monthly cap is reached
    /// or nothing can be reserved, and `NotFound` for unknown profiles.
    pub fn request_withdrawal(
        &self,
        referrer_id: &ProfileId,
        requested_amount: Cents,
        payment: &PaymentDetails,
    ) -> Result<Withdrawal, CoreError> {
        if requested_amount <= 0 {
            return Err(CoreError::InvalidArgument(String::from(
                "amount must be positive",
            )));
        }
        payment.validate().map_err(|err| match err {
            DomainError::InvalidPaymentDetails(msg) => CoreError::InvalidArgument(msg),
            other => CoreError::InvalidArgument(other.to_string()),
        })?;
        let config: Arc<AffiliateConfig> = self.ctx.config.get_config()?;
        let now: OffsetDateTime = self.ctx.now();

        let withdrawal: Withdrawal = self
            .ctx
            .store
            .run_transaction(|tx| -> Result<_, CoreError> {
                let profile: AffiliateProfile = load_profile(tx, referrer_id)?;
                if !profile.is_active() {
                    return Err(CoreError::PermissionDenied(String::from(
                        "account is not active",
                    )));
                }
                let PayoutCheck { requires_review } = check_payout(&profile)?;
                if tx.active_withdrawal(referrer_id)?.is_some() {
                    return Err(CoreError::FailedPrecondition(String::from(
                        "withdrawal already pending",
                    )));
                }
                let settings = &config.withdrawal;
                if requested_amount < settings.minimum_amount
                    || profile.balance.available < settings.minimum_amount
                {
                    return Err(CoreError::FailedPrecondition(String::from(
                        "minimum amount not met",
                    )));
                }

                let this_month: Vec<Withdrawal> = tx
                    .withdrawals_since(referrer_id, month_start(now))?
                    .into_iter()
                    .filter(counts_towards_monthly_cap)
                    .collect();
                if let Some(cap) = settings.max_per_month
                    && this_month.len() >= usize::try_from(cap).unwrap_or(usize::MAX)
                {
                    return Err(CoreError::FailedPrecondition(String::from(
                        "monthly withdrawal limit reached",
                    )));
                }
                let mut target: Cents = requested_amount.min(profile.balance.available);
                if let Some(cap) = settings.max_amount_per_month {
                    let used: Cents = this_month.iter().map(|w| w.amount).sum();
                    let remaining: Cents = cap.saturating_sub(used);
                    if remaining < settings.minimum_amount {
                        return Err(CoreError::FailedPrecondition(String::from(
                            "monthly withdrawal amount limit reached",
                        )));
                    }
                    target = target.min(remaining);
                }

                let candidates: Vec<Commission> = tx.available_commissions(referrer_id)?;
                let selection: CommissionSelection = select_commissions_fifo(&candidates, target);
                if selection.total <= 0 {
                    return Err(CoreError::FailedPrecondition(String::from(
                        "insufficient balance",
                    )));
                }
                if selection.total < settings.minimum_amount {
                    return Err(CoreError::FailedPrecondition(String::from(
                        "minimum amount not met",
                    )));
                }

                let withdrawal: Withdrawal = Withdrawal {
                    id: WithdrawalId::generate(now),
                    referrer_id: referrer_id.clone(),
                    requested_amount,
                    amount: selection.total,
                    currency: config.default_currency.clone(),
                    commission_ids: selection.commission_ids,
                    status: WithdrawalStatus::Pending,
                    payment: payment.clone(),
                    requires_review,
                    created_at: now,
                    approved_at: None,
                    approved_by: None,
                    processing_at: None,
                    completed_at: None,
                    rejected_at: None,
                    rejection_reason: None,
                    failed_at: None,
                    failure: None,
                    transfer: TransferProgress::default(),
                    funds_released_at: None,
                    funds_released_by: None,
                    status_history: vec![StatusChange {
                        status: WithdrawalStatus::Pending,
                        at: now,
                        actor_id: Some(referrer_id.to_string()),
                        note: None,
                    }],
                };
                tx.insert_withdrawal(&withdrawal)?;
                let reserved: Cents =
                    CommissionLedger::<S>::reserve_for_withdrawal(tx, &withdrawal, now)?;
                debug_assert_eq!(reserved, withdrawal.amount);
                Ok(withdrawal)
            })?;

        info!(
            withdrawal_id = %withdrawal.id,
            referrer_id = %referrer_id,
            requested = requested_amount,
            amount = withdrawal.amount,
            commissions = withdrawal.commission_ids.len(),
            requires_review = withdrawal.requires_review,
            "Created withdrawal"
        );
        Ok(withdrawal)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id or a domain error if the
    /// withdrawal is not pending.
    pub fn approve_withdrawal(
        &self,
        id: &WithdrawalId,
        actor: &Actor,
    ) -> Result<Withdrawal, CoreError> {
        let now: OffsetDateTime = self.ctx.now();
        let approved: Withdrawal =
            self.ctx
                .store
                .run_transaction(|tx| -> Result<_, CoreError> {
                    let mut withdrawal: Withdrawal = load_withdrawal(tx, id)?;
                    let before = snapshot(&withdrawal.status);
                    withdrawal.transition(
                        WithdrawalStatus::Approved,
                        Some(actor.id.as_str()),
                        None,
                        now,
                    )?;
                    tx.put_withdrawal(&withdrawal)?;
                    record_audit_event(
                        tx,
                        EntityRef::new("withdrawal", id.as_str()),
                        actor,
                        "approved",
                        "ApproveWithdrawal",
                        None,
                        before,
                        snapshot(&withdrawal.status),
                        now,
                    )?;
                    Ok(withdrawal)
                })?;
        info!(withdrawal_id = %id, actor = %actor.id, "Approved withdrawal");
        Ok(approved)
    }

    /// Rejects a withdrawal that has not started processing and returns its
    /// commissions to the available bucket.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty reason, `NotFound` for an
    /// unknown id, or a domain error if the withdrawal is processing or
    /// terminal.
    pub fn reject_withdrawal(
        &self,
        id: &WithdrawalId,
        actor: &Actor,
        reason: &str,
    ) -> Result<Withdrawal, CoreError> {
        if reason.trim().is_empty() {
            return Err(CoreError::InvalidArgument(String::from(
                "a reason is required",
            )));
        }
        let now: OffsetDateTime = self.ctx.now();
        let rejected: Withdrawal =
            self.ctx
                .store
                .run_transaction(|tx| -> Result<_, CoreError> {
                    let mut withdrawal: Withdrawal = load_withdrawal(tx, id)?;
                    let before = snapshot(&withdrawal.status);
                    withdrawal.transition(
                        WithdrawalStatus::Rejected,
                        Some(actor.id.as_str()),
                        Some(reason),
                        now,
                    )?;
                    CommissionLedger::<S>::unreserve_withdrawal(tx, &withdrawal)?;
                    withdrawal.funds_released_at = Some(now);
                    withdrawal.funds_released_by = Some(actor.id.clone());
                    tx.put_withdrawal(&withdrawal)?;
                    record_audit_event(
                        tx,
                        EntityRef::new("withdrawal", id.as_str()),
                        actor,
                        reason,
                        "RejectWithdrawal",
                        Some(format!("released {}", withdrawal.amount)),
                        before,
                        snapshot(&withdrawal.status),
                        now,
                    )?;
                    Ok(withdrawal)
                })?;
        info!(withdrawal_id = %id, actor = %actor.id, "Rejected withdrawal");
        Ok(rejected)
    }

    /// Returns the reserved commissions of a failed withdrawal to the
    /// available bucket. Allowed once per withdrawal.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty reason, `NotFound` for an
    /// unknown id, or `FailedPrecondition` unless the withdrawal failed and
    /// was not released yet.
    pub fn release_failed_withdrawal(
        &self,
        id: &WithdrawalId,
        actor: &Actor,
        reason: &str,
    ) -> Result<Withdrawal, CoreError> {
        if reason.trim().is_empty() {
            return Err(CoreError::InvalidArgument(String::from(
                "a reason is required",
            )));
        }
        let now: OffsetDateTime = self.ctx.now();
        let released: Withdrawal =
            self.ctx
                .store
                .run_transaction(|tx| -> Result<_, CoreError> {
                    let mut withdrawal: Withdrawal = load_withdrawal(tx, id)?;
                    if !withdrawal.can_release_funds() {
                        return Err(CoreError::FailedPrecondition(String::from(
                            "withdrawal funds cannot be released",
                        )));
                    }
                    let before = snapshot(&withdrawal.funds_released_at.is_some());
                    let amount: Cents = CommissionLedger::<S>::unreserve_withdrawal(tx, &withdrawal)?;
                    withdrawal.funds_released_at = Some(now);
                    withdrawal.funds_released_by = Some(actor.id.clone());
                    tx.put_withdrawal(&withdrawal)?;
                    record_audit_event(
                        tx,
                        EntityRef::new("withdrawal", id.as_str()),
                        actor,
                        reason,
                        "ReleaseFailedWithdrawal",
                        Some(format!("released {amount}")),
                        before,
                        snapshot(&withdrawal.funds_released_at.is_some()),
                        now,
                    )?;
                    Ok(withdrawal)
                })?;
        info!(
            withdrawal_id = %id,
            actor = %actor.id,
            amount = released.amount,
            "Released funds of failed withdrawal"
        );
        Ok(released)
    }

    /// Runs the transfer saga for an approved withdrawal.
    ///
    /// Returns the withdrawal in its resulting state: `completed` if the
    /// provider reported success while funding, `failed` if any step failed
    /// or timed out, otherwise still `processing`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, a domain error if the withdrawal
    /// is not approved, or a store error.
    pub async fn process_withdrawal(&self, id: &WithdrawalId) -> Result<Withdrawal, CoreError> {
        let config: Arc<AffiliateConfig> = self.ctx.config.get_config()?;
        let timeout: std::time::Duration =
            std::time::Duration::from_secs(config.withdrawal.transfer_timeout_secs);
        let now: OffsetDateTime = self.ctx.now();

        let withdrawal: Withdrawal =
            run_transaction_async(&*self.ctx.store, |tx| -> Result<_, CoreError> {
                let mut withdrawal: Withdrawal = load_withdrawal(tx, id)?;
                withdrawal.transition(WithdrawalStatus::Processing, None, None, now)?;
                tx.put_withdrawal(&withdrawal)?;
                Ok(withdrawal)
            })
            .await?;
        info!(withdrawal_id = %id, amount = withdrawal.amount, "Processing withdrawal");

        match self.run_saga(&withdrawal, timeout).await {
            Ok(SagaEnd::Completed) => self.complete(id).await,
            Ok(SagaEnd::Pending) => self.reload(id).await,
            Err(failure) => self.fail(id, failure).await,
        }
    }

    async fn run_saga(
        &self,
        withdrawal: &Withdrawal,
        timeout: std::time::Duration,
    ) -> Result<SagaEnd, TransferFailure> {
        let id: &WithdrawalId = &withdrawal.id;
        let recipient_id: String = self.ensure_recipient(withdrawal, timeout).await?;
        self.record_progress(id, |t| t.recipient_id = Some(recipient_id.clone()))
            .await
            .map_err(|err| store_failure("record_progress", &err))?;

        let quote: Quote = bounded(
            "create_quote",
            timeout,
            self.provider.create_quote(
                withdrawal.amount,
                &withdrawal.currency,
                &withdrawal.payment.currency,
            ),
        )
        .await?;
        self.record_progress(id, |t| t.quote_id = Some(quote.quote_id.clone()))
            .await
            .map_err(|err| store_failure("record_progress", &err))?;

        let transfer_id: String = bounded(
            "create_transfer",
            timeout,
            self.provider
                .create_transfer(&recipient_id, &quote.quote_id, id.as_str()),
        )
        .await?;
        self.record_progress(id, |t| t.transfer_id = Some(transfer_id.clone()))
            .await
            .map_err(|err| store_failure("record_progress", &err))?;

        let status: TransferStatus = bounded(
            "fund_transfer",
            timeout,
            self.provider.fund_transfer(&transfer_id),
        )
        .await?;
        self.record_progress(id, |t| {
            t.provider_status = Some(status.as_str().to_string());
        })
        .await
        .map_err(|err| store_failure("record_progress", &err))?;

        settle(status, "fund_transfer")
    }

    /// Reuses the profile's cached recipient while the payment details are
    /// unchanged, otherwise creates and caches a new one.
    async fn ensure_recipient(
        &self,
        withdrawal: &Withdrawal,
        timeout: std::time::Duration,
    ) -> Result<String, TransferFailure> {
        let fingerprint: String = withdrawal.payment.fingerprint();
        let profile: AffiliateProfile =
            run_transaction_async(&*self.ctx.store, |tx| -> Result<_, CoreError> {
                load_profile(tx, &withdrawal.referrer_id)
            })
            .await
            .map_err(|err| store_failure("create_recipient", &err))?;
        if let Some(recipient) = &profile.payout_recipient
            && recipient.details_fingerprint == fingerprint
        {
            debug!(withdrawal_id = %withdrawal.id, "Reusing payout recipient");
            return Ok(recipient.recipient_id.clone());
        }

        let recipient_id: String = bounded(
            "create_recipient",
            timeout,
            self.provider.create_recipient(&withdrawal.payment),
        )
        .await?;
        let now: OffsetDateTime = self.ctx.now();
        run_transaction_async(&*self.ctx.store, |tx| -> Result<_, CoreError> {
            let mut profile: AffiliateProfile = load_profile(tx, &withdrawal.referrer_id)?;
            profile.payout_recipient = Some(PayoutRecipient {
                recipient_id: recipient_id.clone(),
                details_fingerprint: fingerprint.clone(),
                created_at: now,
            });
            tx.put_profile(&profile)?;
            Ok(())
        })
        .await
        .map_err(|err| store_failure("create_recipient", &err))?;
        Ok(recipient_id)
    }

    async fn record_progress<F>(&self, id: &WithdrawalId, update: F) -> Result<(), CoreError>
    where
        F: Fn(&mut TransferProgress) + Send + Sync,
    {
        run_transaction_async(&*self.ctx.store, |tx| -> Result<_, CoreError> {
            let mut withdrawal: Withdrawal = load_withdrawal(tx, id)?;
            update(&mut withdrawal.transfer);
            tx.put_withdrawal(&withdrawal)?;
            Ok(())
        })
        .await
    }

    /// Polls the provider for a processing withdrawal.
    ///
    /// Transient poll errors leave the withdrawal processing; terminal ones
    /// fail it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, `FailedPrecondition` if the
    /// withdrawal is not processing or has no transfer yet, or a store error.
    pub async fn refresh_withdrawal(&self, id: &WithdrawalId) -> Result<Withdrawal, CoreError> {
        let config: Arc<AffiliateConfig> = self.ctx.config.get_config()?;
        let timeout: std::time::Duration =
            std::time::Duration::from_secs(config.withdrawal.transfer_timeout_secs);
        let withdrawal: Withdrawal = self.reload(id).await?;
        if withdrawal.status != WithdrawalStatus::Processing {
            return Err(CoreError::FailedPrecondition(String::from(
                "withdrawal is not processing",
            )));
        }
        let Some(transfer_id) = withdrawal.transfer.transfer_id.clone() else {
            return Err(CoreError::FailedPrecondition(String::from(
                "withdrawal has no transfer",
            )));
        };

        let observed: Result<TransferStatus, TransferFailure> = bounded(
            "get_transfer",
            timeout,
            self.provider.get_transfer(&transfer_id),
        )
        .await;
        match observed {
            Ok(status) => {
                self.record_progress(id, |t| {
                    t.provider_status = Some(status.as_str().to_string());
                })
                .await?;
                match settle(status, "get_transfer") {
                    Ok(SagaEnd::Completed) => self.complete(id).await,
                    Ok(SagaEnd::Pending) => self.reload(id).await,
                    Err(failure) => self.fail(id, failure).await,
                }
            }
            Err(failure) if failure.kind == FailureKind::Terminal => self.fail(id, failure).await,
            Err(failure) => {
                warn!(
                    withdrawal_id = %id,
                    reason = %failure.reason,
                    "Transfer status poll failed, will retry"
                );
                Ok(withdrawal)
            }
        }
    }

    /// Refreshes every processing withdrawal from the provider, then fails
    /// those still not final after the configured stale age.
    ///
    /// A transfer the provider reports as completed is completed even when
    /// it is past the stale age.
    ///
    /// # Errors
    ///
    /// Returns an error only if the processing withdrawals cannot be listed.
    pub async fn poll_processing(&self) -> Result<PollReport, CoreError> {
        let config: Arc<AffiliateConfig> = self.ctx.config.get_config()?;
        let now: OffsetDateTime = self.ctx.now();
        let stale_hours: u32 = config.withdrawal.stale_processing_hours;
        let stale_after: Duration = Duration::hours(i64::from(stale_hours));
        let processing: Vec<Withdrawal> = run_transaction_async(&*self.ctx.store, |tx| {
            tx.withdrawals_by_status(WithdrawalStatus::Processing)
        })
        .await?;

        let mut report = PollReport {
            checked: processing.len(),
            ..PollReport::default()
        };
        let mut to_refresh: Vec<(WithdrawalId, bool)> = Vec::new();
        let mut to_expire: Vec<WithdrawalId> = Vec::new();
        for withdrawal in processing {
            let started: OffsetDateTime = withdrawal.processing_at.unwrap_or(withdrawal.created_at);
            let stale: bool = now - started >= stale_after;
            if withdrawal.transfer.transfer_id.is_some() {
                to_refresh.push((withdrawal.id, stale));
            } else if stale {
                to_expire.push(withdrawal.id);
            } else {
                report.still_processing += 1;
            }
        }

        let results: Vec<(WithdrawalId, bool, Result<Withdrawal, CoreError>)> =
            futures::stream::iter(to_refresh)
                .map(|(id, stale)| async move {
                    let result = self.refresh_withdrawal(&id).await;
                    (id, stale, result)
                })
                .buffer_unordered(POLL_CONCURRENCY)
                .collect()
                .await;
        for (id, stale, result) in results {
            match result {
                Ok(w) if w.status == WithdrawalStatus::Completed => report.completed += 1,
                Ok(w) if w.status == WithdrawalStatus::Failed => report.failed += 1,
                Ok(_) if stale => to_expire.push(id),
                Ok(_) => report.still_processing += 1,
                Err(err) => {
                    report.errors += 1;
                    warn!(withdrawal_id = %id, error = %err, "Failed to refresh withdrawal");
                }
            }
        }

        for id in to_expire {
            let failure = TransferFailure {
                kind: FailureKind::Transient,
                step: String::from("observe"),
                reason: format!("transfer did not finish within {stale_hours} hours"),
            };
            match self.fail(&id, failure).await {
                Ok(_) => report.failed += 1,
                Err(err) => {
                    report.errors += 1;
                    warn!(withdrawal_id = %id, error = %err, "Failed to expire stale withdrawal");
                }
            }
        }

        info!(
            checked = report.checked,
            completed = report.completed,
            failed = report.failed,
            still_processing = report.still_processing,
            errors = report.errors,
            "Polled processing withdrawals"
        );
        Ok(report)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or a store error.
    pub fn withdrawal(&self, id: &WithdrawalId) -> Result<Withdrawal, CoreError> {
        self.ctx
            .store
            .run_transaction(|tx| -> Result<_, CoreError> { load_withdrawal(tx, id) })
    }

    async fn reload(&self, id: &WithdrawalId) -> Result<Withdrawal, CoreError> {
        run_transaction_async(&*self.ctx.store, |tx| -> Result<_, CoreError> {
            load_withdrawal(tx, id)
        })
        .await
    }

    async fn complete(&self, id: &WithdrawalId) -> Result<Withdrawal, CoreError> {
        let now: OffsetDateTime = self.ctx.now();
        let completed: Withdrawal =
            run_transaction_async(&*self.ctx.store, |tx| -> Result<_, CoreError> {
                let mut withdrawal: Withdrawal = load_withdrawal(tx, id)?;
                if withdrawal.status == WithdrawalStatus::Completed {
                    return Ok(withdrawal);
                }
                withdrawal.transition(WithdrawalStatus::Completed, None, None, now)?;
                CommissionLedger::<S>::settle_withdrawal(tx, &withdrawal)?;
                tx.put_withdrawal(&withdrawal)?;
                Ok(withdrawal)
            })
            .await?;
        info!(withdrawal_id = %id, amount = completed.amount, "Completed withdrawal");
        Ok(completed)
    }

    async fn fail(
        &self,
        id: &WithdrawalId,
        failure: TransferFailure,
    ) -> Result<Withdrawal, CoreError> {
        let now: OffsetDateTime = self.ctx.now();
        warn!(
            withdrawal_id = %id,
            step = %failure.step,
            kind = failure.kind.as_str(),
            reason = %failure.reason,
            "Withdrawal transfer failed"
        );
        run_transaction_async(&*self.ctx.store, |tx| -> Result<_, CoreError> {
            let mut withdrawal: Withdrawal = load_withdrawal(tx, id)?;
            withdrawal.transition(
                WithdrawalStatus::Failed,
                None,
                Some(failure.reason.as_str()),
                now,
            )?;
            withdrawal.failure = Some(failure.clone());
            tx.put_withdrawal(&withdrawal)?;
            Ok(withdrawal)
        })
        .await
    }
}

enum SagaEnd {
    Completed,
    /// The transfer is funded but not final yet.
    Pending,
}

fn settle(status: TransferStatus, step: &str) -> Result<SagaEnd, TransferFailure> {
    if status.is_success() {
        Ok(SagaEnd::Completed)
    } else if status.is_terminal() {
        Err(TransferFailure {
            kind: FailureKind::Terminal,
            step: step.to_string(),
            reason: format!("transfer ended with status {}", status.as_str()),
        })
    } else {
        Ok(SagaEnd::Pending)
    }
}

/// Awaits one provider call, bounded by `timeout`.
async fn bounded<T>(
    step: &str,
    timeout: std::time::Duration,
    call: impl Future<Output = Result<T, ProviderError>> + Send,
) -> Result<T, TransferFailure> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TransferFailure {
            kind: err.kind,
            step: step.to_string(),
            reason: err.message,
        }),
        Err(_) => Err(TransferFailure {
            kind: FailureKind::Transient,
            step: step.to_string(),
            reason: format!("timed out after {}s", timeout.as_secs()),
        }),
    }
}

fn store_failure(step: &str, err: &CoreError) -> TransferFailure {
    TransferFailure {
        kind: FailureKind::Transient,
        step: step.to_string(),
        reason: err.to_string(),
    }
}

fn load_withdrawal(tx: &mut dyn LedgerTx, id: &WithdrawalId) -> Result<Withdrawal, CoreError> {
    tx.withdrawal(id)?
        .ok_or_else(|| CoreError::not_found("withdrawal", id))
}

/// Withdrawals that used up part of the monthly allowance.
fn counts_towards_monthly_cap(withdrawal: &Withdrawal) -> bool {
    match withdrawal.status {
        WithdrawalStatus::Rejected => false,
        WithdrawalStatus::Failed => withdrawal.funds_released_at.is_none(),
        _ => true,
    }
}
