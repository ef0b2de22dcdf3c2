// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Scheduled validate and release passes.
//!
//! A pass reads one page of due commissions, groups it by referrer and runs
//! one transaction per group. Consecutive passes continue after the last
//! commission of the previous page and start over from the oldest due
//! commission once a page comes back short, so a group that keeps failing
//! cannot hold back the commissions behind it. Inside that transaction every commission is
//! re-read and only advanced if it is still in the expected status and
//! due, so overlapping or retried passes never apply a delta twice. Each
//! group writes one rolled-up balance delta to its referrer.

use crate::context::EngineContext;
use crate::error::CoreError;
use crate::ledger::apply_balance_delta;
use crate::store::{DueCursor, LedgerStore};
use affilink_domain::{BalanceDelta, Commission, CommissionId, CommissionStatus, ProfileId};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Default number of commissions read per pass.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Counters from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Commissions returned by the due query.
    pub scanned: usize,
    pub advanced: usize,
    /// Commissions that had already moved on when re-read.
    pub skipped: usize,
    /// Commissions in groups whose transaction failed.
    pub failed: usize,
    /// Referrers whose group committed.
    pub referrers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Validate,
    Release,
}

impl Pass {
    const fn status(self) -> CommissionStatus {
        match self {
            Self::Validate => CommissionStatus::Pending,
            Self::Release => CommissionStatus::Validated,
        }
    }

    const fn due_at(self, commission: &Commission) -> OffsetDateTime {
        match self {
            Self::Validate => commission.hold_until,
            Self::Release => commission.available_at,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Release => "release",
        }
    }

    fn advance(
        self,
        commission: &mut Commission,
        now: OffsetDateTime,
    ) -> Result<Option<BalanceDelta>, CoreError> {
        match self {
            Self::Validate if commission.is_due_for_validation(now) => {
                Ok(Some(commission.validate(now)?))
            }
            Self::Release if commission.is_due_for_release(now) => {
                Ok(Some(commission.release(now)?))
            }
            _ => Ok(None),
        }
    }
}

pub struct Reconciler<S> {
    ctx: EngineContext<S>,
    page_size: usize,
    validate_cursor: Mutex<Option<DueCursor>>,
    release_cursor: Mutex<Option<DueCursor>>,
}

impl<S: LedgerStore> Reconciler<S> {
    #[must_use]
    pub const fn new(ctx: EngineContext<S>, page_size: usize) -> Self {
        Self {
            ctx,
            page_size,
            validate_cursor: Mutex::new(None),
            release_cursor: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Moves one page of due pending commissions to validated, or straight
    /// to available when their release time has also passed.
    ///
    /// # Errors
    ///
    /// Returns an error only if the due commissions cannot be queried.
    pub fn validate_pass(&self) -> Result<ReconcileReport, CoreError> {
        self.run_pass(Pass::Validate)
    }

    /// Moves one page of due validated commissions to available.
    ///
    /// # Errors
    ///
    /// Returns an error only if the due commissions cannot be queried.
    pub fn release_pass(&self) -> Result<ReconcileReport, CoreError> {
        self.run_pass(Pass::Release)
    }

    fn run_pass(&self, pass: Pass) -> Result<ReconcileReport, CoreError> {
        let now: OffsetDateTime = self.ctx.now();
        let cursor: &Mutex<Option<DueCursor>> = match pass {
            Pass::Validate => &self.validate_cursor,
            Pass::Release => &self.release_cursor,
        };
        let after: Option<DueCursor> = cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let due: Vec<Commission> = self.ctx.store.run_transaction(|tx| {
            tx.due_commissions(pass.status(), now, after.as_ref(), self.page_size)
        })?;
        let next: Option<DueCursor> = if due.len() < self.page_size {
            None
        } else {
            due.last().map(|last| DueCursor {
                due_at: pass.due_at(last),
                id: last.id.clone(),
            })
        };
        *cursor.lock().unwrap_or_else(PoisonError::into_inner) = next;

        let mut report = ReconcileReport {
            scanned: due.len(),
            ..ReconcileReport::default()
        };
        let mut groups: BTreeMap<ProfileId, Vec<CommissionId>> = BTreeMap::new();
        for commission in due {
            groups
                .entry(commission.referrer_id)
                .or_default()
                .push(commission.id);
        }

        for (referrer_id, ids) in &groups {
            match self.advance_group(pass, referrer_id, ids, now) {
                Ok((advanced, skipped)) => {
                    report.advanced += advanced;
                    report.skipped += skipped;
                    report.referrers += 1;
                    debug!(
                        pass = pass.name(),
                        referrer_id = %referrer_id,
                        advanced,
                        skipped,
                        "Reconciled referrer"
                    );
                }
                Err(err) => {
                    report.failed += ids.len();
                    warn!(
                        pass = pass.name(),
                        referrer_id = %referrer_id,
                        commissions = ids.len(),
                        error = %err,
                        "Reconciliation failed for referrer"
                    );
                }
            }
        }

        info!(
            pass = pass.name(),
            scanned = report.scanned,
            advanced = report.advanced,
            skipped = report.skipped,
            failed = report.failed,
            referrers = report.referrers,
            "Reconciliation pass complete"
        );
        Ok(report)
    }

    fn advance_group(
        &self,
        pass: Pass,
        referrer_id: &ProfileId,
        ids: &[CommissionId],
        now: OffsetDateTime,
    ) -> Result<(usize, usize), CoreError> {
        self.ctx
            .store
            .run_transaction(|tx| -> Result<_, CoreError> {
                let mut rolled_up = BalanceDelta::default();
                let mut advanced: usize = 0;
                let mut skipped: usize = 0;
                for id in ids {
                    let Some(mut commission) = tx.commission(id)? else {
                        skipped += 1;
                        continue;
                    };
                    match pass.advance(&mut commission, now)? {
                        Some(delta) => {
                            rolled_up.combine(&delta)?;
                            tx.put_commission(&commission)?;
                            advanced += 1;
                        }
                        None => skipped += 1,
                    }
                }
                apply_balance_delta(tx, referrer_id, &rolled_up)?;
                Ok((advanced, skipped))
            })
    }
}
