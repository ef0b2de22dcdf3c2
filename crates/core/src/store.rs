// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Repository contract shared by every ledger backend.
//!
//! All reads a mutation depends on happen through the same [`LedgerTx`]
//! the mutation writes through, so a transaction body always decides on the
//! state it commits against. Backends either serialize transactions or
//! report [`StoreError::Conflict`], in which case [`LedgerStore::run_transaction`]
//! re-executes the body.

use crate::error::{StoreError, TxFailure};
use affilink_audit::AuditEvent;
use affilink_domain::{
    AffiliateConfig, AffiliateProfile, CodeSlot, Commission, CommissionId, CommissionStatus,
    CommissionType, FraudAlert, ProfileId, Referral, ReferralScheme, SourceKey, Withdrawal,
    WithdrawalId, WithdrawalStatus,
};
use time::OffsetDateTime;
use tracing::warn;

/// Maximum number of times a conflicting transaction is attempted.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

const BASE_BACKOFF_MS: u64 = 5;

/// A position in the due order of [`LedgerTx::due_commissions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueCursor {
    pub due_at: OffsetDateTime,
    pub id: CommissionId,
}

/// Reads and writes available inside one transaction.
///
/// Writes are only visible to other transactions after the body returns
/// `Ok` and the backend commits.
pub trait LedgerTx {
    // Profiles

    fn profile(&mut self, id: &ProfileId) -> Result<Option<AffiliateProfile>, StoreError>;

    /// Inserts a new profile and its codes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` if the id or any code is taken.
    fn insert_profile(&mut self, profile: &AffiliateProfile) -> Result<(), StoreError>;

    /// Replaces an existing profile document. Codes are immutable.
    fn put_profile(&mut self, profile: &AffiliateProfile) -> Result<(), StoreError>;

    fn find_profile_by_code(
        &mut self,
        slot: CodeSlot,
        code: &str,
    ) -> Result<Option<ProfileId>, StoreError>;

    /// Profiles other than `exclude` that signed up from `ip` at or after `since`.
    fn count_profiles_by_ip_since(
        &mut self,
        ip: &str,
        since: OffsetDateTime,
        exclude: &ProfileId,
    ) -> Result<u32, StoreError>;

    /// Profiles other than `exclude` that signed up with `device`.
    fn count_profiles_by_device(
        &mut self,
        device: &str,
        exclude: &ProfileId,
    ) -> Result<u32, StoreError>;

    fn profiles_with_qualified_referrals(&mut self) -> Result<Vec<ProfileId>, StoreError>;

    // Commissions

    fn commission(&mut self, id: &CommissionId) -> Result<Option<Commission>, StoreError>;

    fn find_commission_by_source(
        &mut self,
        key: &SourceKey,
    ) -> Result<Option<Commission>, StoreError>;

    /// Inserts a new commission.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` if a commission with the same source
    /// key already exists.
    fn insert_commission(&mut self, commission: &Commission) -> Result<(), StoreError>;

    fn put_commission(&mut self, commission: &Commission) -> Result<(), StoreError>;

    /// Commissions in `status` whose next transition is due at `now`, oldest
    /// due first, at most `limit`. With `after`, only commissions ordered
    /// strictly after that position are returned.
    ///
    /// Pending commissions are due at `hold_until`, validated ones at
    /// `available_at`; ties are ordered by id.
    fn due_commissions(
        &mut self,
        status: CommissionStatus,
        now: OffsetDateTime,
        after: Option<&DueCursor>,
        limit: usize,
    ) -> Result<Vec<Commission>, StoreError>;

    /// Available commissions of a referrer in FIFO order (oldest first).
    fn available_commissions(&mut self, referrer: &ProfileId)
    -> Result<Vec<Commission>, StoreError>;

    fn commissions_for_referrer(
        &mut self,
        referrer: &ProfileId,
    ) -> Result<Vec<Commission>, StoreError>;

    /// Counts non-cancelled commissions of a type for a referrer, optionally
    /// narrowed to one referee and to those created at or after `since`.
    fn count_commissions(
        &mut self,
        referrer: &ProfileId,
        commission_type: CommissionType,
        referee: Option<&ProfileId>,
        since: Option<OffsetDateTime>,
    ) -> Result<u32, StoreError>;

    // Referral edges

    fn referral(
        &mut self,
        referee: &ProfileId,
        scheme: ReferralScheme,
    ) -> Result<Option<Referral>, StoreError>;

    /// Inserts or replaces the edge keyed by `(referee_id, scheme)`.
    fn put_referral(&mut self, referral: &Referral) -> Result<(), StoreError>;

    fn referrals_by_referrer(&mut self, referrer: &ProfileId)
    -> Result<Vec<Referral>, StoreError>;

    // Withdrawals

    fn withdrawal(&mut self, id: &WithdrawalId) -> Result<Option<Withdrawal>, StoreError>;

    /// Inserts a new withdrawal.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` if the referrer already has an active
    /// withdrawal.
    fn insert_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), StoreError>;

    fn put_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), StoreError>;

    fn active_withdrawal(&mut self, referrer: &ProfileId)
    -> Result<Option<Withdrawal>, StoreError>;

    fn withdrawals_since(
        &mut self,
        referrer: &ProfileId,
        since: OffsetDateTime,
    ) -> Result<Vec<Withdrawal>, StoreError>;

    fn withdrawals_by_status(
        &mut self,
        status: WithdrawalStatus,
    ) -> Result<Vec<Withdrawal>, StoreError>;

    // Config, alerts, audit

    fn config(&mut self) -> Result<Option<AffiliateConfig>, StoreError>;

    fn put_config(&mut self, config: &AffiliateConfig) -> Result<(), StoreError>;

    fn insert_fraud_alert(&mut self, alert: &FraudAlert) -> Result<(), StoreError>;

    fn fraud_alerts_for(&mut self, subject: &ProfileId) -> Result<Vec<FraudAlert>, StoreError>;

    fn append_audit_event(&mut self, event: &AuditEvent) -> Result<(), StoreError>;

    fn audit_events_for(
        &mut self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, StoreError>;
}

/// A transactional document store for the ledger.
pub trait LedgerStore: Send + Sync {
    /// Runs `body` once inside a transaction.
    ///
    /// Commits if `body` returns `Ok`, discards every write otherwise.
    ///
    /// # Errors
    ///
    /// Returns the body's error, or a `StoreError` converted into `E` if the
    /// backend fails to begin or commit.
    fn try_transaction<T, E, F>(&self, body: F) -> Result<T, E>
    where
        E: TxFailure,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>;

    /// Runs `body` in a transaction, re-executing it on write conflicts.
    ///
    /// The body must be safe to run more than once: every decision it makes
    /// has to be based on state read through the transaction.
    ///
    /// # Errors
    ///
    /// Returns the body's error, or the last conflict after
    /// [`MAX_TRANSACTION_ATTEMPTS`] attempts.
    fn run_transaction<T, E, F>(&self, mut body: F) -> Result<T, E>
    where
        E: TxFailure,
        F: FnMut(&mut dyn LedgerTx) -> Result<T, E>,
    {
        let mut attempt: u32 = 1;
        loop {
            match self.try_transaction(&mut body) {
                Err(err) if err.is_conflict() && attempt < MAX_TRANSACTION_ATTEMPTS => {
                    warn!(attempt, "Transaction conflict, retrying");
                    std::thread::sleep(backoff(attempt));
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// [`LedgerStore::run_transaction`] for async callers.
///
/// Conflict backoff awaits a tokio timer instead of parking the thread, so
/// other futures on the same worker keep running while a retry waits.
///
/// # Errors
///
/// Returns the body's error, or the last conflict after
/// [`MAX_TRANSACTION_ATTEMPTS`] attempts.
pub async fn run_transaction_async<S, T, E, F>(store: &S, mut body: F) -> Result<T, E>
where
    S: LedgerStore,
    T: Send,
    E: TxFailure + Send,
    F: FnMut(&mut dyn LedgerTx) -> Result<T, E> + Send,
{
    let mut attempt: u32 = 1;
    loop {
        let result: Result<T, E> = store.try_transaction(&mut body);
        let retry: bool = attempt < MAX_TRANSACTION_ATTEMPTS
            && result.as_ref().is_err_and(|err| err.is_conflict());
        if !retry {
            return result;
        }
        drop(result);
        warn!(attempt, "Transaction conflict, retrying");
        tokio::time::sleep(backoff(attempt)).await;
        attempt += 1;
    }
}

fn backoff(attempt: u32) -> std::time::Duration {
    std::time::Duration::from_millis(BASE_BACKOFF_MS << attempt.min(6))
}
