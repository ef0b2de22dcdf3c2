// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! In-memory ledger store.
//!
//! Transactions are serialized by a mutex and run against a private copy of
//! the tables, which replaces the shared tables only when the body succeeds.

use crate::error::{StoreError, TxFailure};
use crate::store::{DueCursor, LedgerStore, LedgerTx};
use affilink_audit::AuditEvent;
use affilink_domain::{
    AffiliateConfig, AffiliateProfile, CodeSlot, Commission, CommissionId, CommissionStatus,
    CommissionType, FraudAlert, ProfileId, Referral, ReferralScheme, SourceKey, Withdrawal,
    WithdrawalId, WithdrawalStatus,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use time::OffsetDateTime;

#[derive(Debug, Clone, Default)]
struct MemoryTables {
    profiles: BTreeMap<ProfileId, AffiliateProfile>,
    codes: BTreeMap<(CodeSlot, String), ProfileId>,
    commissions: BTreeMap<CommissionId, Commission>,
    sources: BTreeMap<SourceKey, CommissionId>,
    referrals: BTreeMap<(ProfileId, ReferralScheme), Referral>,
    withdrawals: BTreeMap<WithdrawalId, Withdrawal>,
    config: Option<AffiliateConfig>,
    fraud_alerts: Vec<FraudAlert>,
    audit_events: Vec<AuditEvent>,
}

/// A `LedgerStore` that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<MemoryTables>,
    forced_conflicts: AtomicU32,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with `StoreError::Conflict`.
    ///
    /// The transaction body still runs; only its commit is refused.
    pub fn force_conflicts(&self, count: u32) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl LedgerStore for InMemoryStore {
    fn try_transaction<T, E, F>(&self, body: F) -> Result<T, E>
    where
        E: TxFailure,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
    {
        // A panicking body never reaches the commit, so the tables behind a
        // poisoned lock are still consistent.
        let mut guard = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let mut working: MemoryTables = guard.clone();
        let tx: &mut dyn LedgerTx = &mut working;
        let value: T = body(tx)?;
        if self.take_forced_conflict() {
            return Err(E::from(StoreError::Conflict(String::from(
                "forced conflict on commit",
            ))));
        }
        *guard = working;
        Ok(value)
    }
}

fn fifo_key(commission: &Commission) -> (OffsetDateTime, CommissionId) {
    (commission.created_at, commission.id.clone())
}

impl LedgerTx for MemoryTables {
    fn profile(&mut self, id: &ProfileId) -> Result<Option<AffiliateProfile>, StoreError> {
        Ok(self.profiles.get(id).cloned())
    }

    fn insert_profile(&mut self, profile: &AffiliateProfile) -> Result<(), StoreError> {
        if self.profiles.contains_key(&profile.id) {
            return Err(StoreError::Duplicate {
                entity: "profile",
                key: profile.id.to_string(),
            });
        }
        for code in &profile.codes {
            if self.codes.contains_key(&(code.slot, code.code.clone())) {
                return Err(StoreError::Duplicate {
                    entity: "referral code",
                    key: code.code.clone(),
                });
            }
        }
        for code in &profile.codes {
            self.codes
                .insert((code.slot, code.code.clone()), profile.id.clone());
        }
        self.profiles.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    fn put_profile(&mut self, profile: &AffiliateProfile) -> Result<(), StoreError> {
        match self.profiles.get_mut(&profile.id) {
            Some(existing) => {
                *existing = profile.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "profile",
                id: profile.id.to_string(),
            }),
        }
    }

    fn find_profile_by_code(
        &mut self,
        slot: CodeSlot,
        code: &str,
    ) -> Result<Option<ProfileId>, StoreError> {
        Ok(self.codes.get(&(slot, code.to_string())).cloned())
    }

    fn count_profiles_by_ip_since(
        &mut self,
        ip: &str,
        since: OffsetDateTime,
        exclude: &ProfileId,
    ) -> Result<u32, StoreError> {
        let count: usize = self
            .profiles
            .values()
            .filter(|p| {
                p.id != *exclude
                    && p.created_at >= since
                    && p.signup.ip_address.as_deref() == Some(ip)
            })
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn count_profiles_by_device(
        &mut self,
        device: &str,
        exclude: &ProfileId,
    ) -> Result<u32, StoreError> {
        let count: usize = self
            .profiles
            .values()
            .filter(|p| p.id != *exclude && p.signup.device_fingerprint.as_deref() == Some(device))
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn profiles_with_qualified_referrals(&mut self) -> Result<Vec<ProfileId>, StoreError> {
        Ok(self
            .profiles
            .values()
            .filter(|p| p.stats.qualified_referrals > 0)
            .map(|p| p.id.clone())
            .collect())
    }

    fn commission(&mut self, id: &CommissionId) -> Result<Option<Commission>, StoreError> {
        Ok(self.commissions.get(id).cloned())
    }

    fn find_commission_by_source(
        &mut self,
        key: &SourceKey,
    ) -> Result<Option<Commission>, StoreError> {
        Ok(self
            .sources
            .get(key)
            .and_then(|id| self.commissions.get(id))
            .cloned())
    }

    fn insert_commission(&mut self, commission: &Commission) -> Result<(), StoreError> {
        let key: SourceKey = commission.source_key();
        if self.sources.contains_key(&key) || self.commissions.contains_key(&commission.id) {
            return Err(StoreError::Duplicate {
                entity: "commission",
                key: format!(
                    "{}/{}/{}/{}",
                    key.referrer_id,
                    key.referee_id,
                    key.commission_type.as_str(),
                    key.dedupe_key
                ),
            });
        }
        self.sources.insert(key, commission.id.clone());
        self.commissions
            .insert(commission.id.clone(), commission.clone());
        Ok(())
    }

    fn put_commission(&mut self, commission: &Commission) -> Result<(), StoreError> {
        match self.commissions.get_mut(&commission.id) {
            Some(existing) => {
                *existing = commission.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "commission",
                id: commission.id.to_string(),
            }),
        }
    }

    fn due_commissions(
        &mut self,
        status: CommissionStatus,
        now: OffsetDateTime,
        after: Option<&DueCursor>,
        limit: usize,
    ) -> Result<Vec<Commission>, StoreError> {
        let due_at = |c: &Commission| match status {
            CommissionStatus::Validated => c.available_at,
            _ => c.hold_until,
        };
        let mut due: Vec<Commission> = self
            .commissions
            .values()
            .filter(|c| c.status == status && due_at(c) <= now)
            .filter(|c| {
                after.is_none_or(|cursor| (due_at(c), &c.id) > (cursor.due_at, &cursor.id))
            })
            .cloned()
            .collect();
        due.sort_by_key(|c| (due_at(c), c.id.clone()));
        due.truncate(limit);
        Ok(due)
    }

    fn available_commissions(
        &mut self,
        referrer: &ProfileId,
    ) -> Result<Vec<Commission>, StoreError> {
        let mut available: Vec<Commission> = self
            .commissions
            .values()
            .filter(|c| c.referrer_id == *referrer && c.status == CommissionStatus::Available)
            .cloned()
            .collect();
        available.sort_by_key(fifo_key);
        Ok(available)
    }

    fn commissions_for_referrer(
        &mut self,
        referrer: &ProfileId,
    ) -> Result<Vec<Commission>, StoreError> {
        let mut commissions: Vec<Commission> = self
            .commissions
            .values()
            .filter(|c| c.referrer_id == *referrer)
            .cloned()
            .collect();
        commissions.sort_by_key(fifo_key);
        Ok(commissions)
    }

    fn count_commissions(
        &mut self,
        referrer: &ProfileId,
        commission_type: CommissionType,
        referee: Option<&ProfileId>,
        since: Option<OffsetDateTime>,
    ) -> Result<u32, StoreError> {
        let count: usize = self
            .commissions
            .values()
            .filter(|c| {
                c.referrer_id == *referrer
                    && c.commission_type == commission_type
                    && c.status != CommissionStatus::Cancelled
                    && referee.is_none_or(|r| c.referee_id == *r)
                    && since.is_none_or(|s| c.created_at >= s)
            })
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn referral(
        &mut self,
        referee: &ProfileId,
        scheme: ReferralScheme,
    ) -> Result<Option<Referral>, StoreError> {
        Ok(self.referrals.get(&(referee.clone(), scheme)).cloned())
    }

    fn put_referral(&mut self, referral: &Referral) -> Result<(), StoreError> {
        self.referrals.insert(
            (referral.referee_id.clone(), referral.scheme),
            referral.clone(),
        );
        Ok(())
    }

    fn referrals_by_referrer(
        &mut self,
        referrer: &ProfileId,
    ) -> Result<Vec<Referral>, StoreError> {
        let mut referrals: Vec<Referral> = self
            .referrals
            .values()
            .filter(|r| r.referrer_id == *referrer)
            .cloned()
            .collect();
        referrals.sort_by_key(|r| r.attributed_at);
        Ok(referrals)
    }

    fn withdrawal(&mut self, id: &WithdrawalId) -> Result<Option<Withdrawal>, StoreError> {
        Ok(self.withdrawals.get(id).cloned())
    }

    fn insert_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), StoreError> {
        let has_active: bool = self
            .withdrawals
            .values()
            .any(|w| w.referrer_id == withdrawal.referrer_id && w.is_active());
        if has_active || self.withdrawals.contains_key(&withdrawal.id) {
            return Err(StoreError::Duplicate {
                entity: "active withdrawal",
                key: withdrawal.referrer_id.to_string(),
            });
        }
        self.withdrawals
            .insert(withdrawal.id.clone(), withdrawal.clone());
        Ok(())
    }

    fn put_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<(), StoreError> {
        match self.withdrawals.get_mut(&withdrawal.id) {
            Some(existing) => {
                *existing = withdrawal.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "withdrawal",
                id: withdrawal.id.to_string(),
            }),
        }
    }

    fn active_withdrawal(
        &mut self,
        referrer: &ProfileId,
    ) -> Result<Option<Withdrawal>, StoreError> {
        Ok(self
            .withdrawals
            .values()
            .find(|w| w.referrer_id == *referrer && w.is_active())
            .cloned())
    }

    fn withdrawals_since(
        &mut self,
        referrer: &ProfileId,
        since: OffsetDateTime,
    ) -> Result<Vec<Withdrawal>, StoreError> {
        Ok(self
            .withdrawals
            .values()
            .filter(|w| w.referrer_id == *referrer && w.created_at >= since)
            .cloned()
            .collect())
    }

    fn withdrawals_by_status(
        &mut self,
        status: WithdrawalStatus,
    ) -> Result<Vec<Withdrawal>, StoreError> {
        let mut withdrawals: Vec<Withdrawal> = self
            .withdrawals
            .values()
            .filter(|w| w.status == status)
            .cloned()
            .collect();
        withdrawals.sort_by_key(|w| w.created_at);
        Ok(withdrawals)
    }

    fn config(&mut self) -> Result<Option<AffiliateConfig>, StoreError> {
        Ok(self.config.clone())
    }

    fn put_config(&mut self, config: &AffiliateConfig) -> Result<(), StoreError> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn insert_fraud_alert(&mut self, alert: &FraudAlert) -> Result<(), StoreError> {
        self.fraud_alerts.push(alert.clone());
        Ok(())
    }

    fn fraud_alerts_for(&mut self, subject: &ProfileId) -> Result<Vec<FraudAlert>, StoreError> {
        Ok(self
            .fraud_alerts
            .iter()
            .filter(|a| a.subject_id == *subject)
            .cloned()
            .collect())
    }

    fn append_audit_event(&mut self, event: &AuditEvent) -> Result<(), StoreError> {
        self.audit_events.push(event.clone());
        Ok(())
    }

    fn audit_events_for(
        &mut self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(self
            .audit_events
            .iter()
            .filter(|e| e.entity.entity_type == entity_type && e.entity.entity_id == entity_id)
            .cloned()
            .collect())
    }
}
