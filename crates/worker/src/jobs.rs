// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The scheduled jobs and one cycle over them.

use affilink::{
    AffiliateEngine, CoreError, LedgerStore, ReconcileReport, Reconciler, TierScanReport,
};
use tracing::{error, info};

/// Upper bound on pages drained by one pass in one cycle.
const MAX_PAGES_PER_PASS: usize = 100;

/// What one cycle did. A `None` report means the job failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub validated: Option<ReconcileReport>,
    pub released: Option<ReconcileReport>,
    pub tiers: Option<TierScanReport>,
}

impl CycleReport {
    #[must_use]
    pub fn failed_jobs(&self) -> usize {
        usize::from(self.validated.is_none())
            + usize::from(self.released.is_none())
            + usize::from(self.tiers.is_none())
    }
}

/// Runs the validate pass, the release pass and the tier scan.
pub struct Jobs<'a, S> {
    engine: &'a AffiliateEngine<S>,
    reconciler: Reconciler<S>,
}

impl<'a, S: LedgerStore> Jobs<'a, S> {
    /// # Arguments
    ///
    /// * `engine` - The engine the jobs run against
    /// * `page_size` - Commissions fetched per reconciliation page
    #[must_use]
    pub fn new(engine: &'a AffiliateEngine<S>, page_size: usize) -> Self {
        Self {
            engine,
            reconciler: Reconciler::new(engine.context().clone(), page_size.max(1)),
        }
    }

    /// Runs every job once. A failing job is logged and does not stop the
    /// jobs after it.
    pub fn run_cycle(&self) -> CycleReport {
        let validated: Option<ReconcileReport> =
            log_job("validate_pass", self.drain(|r| r.validate_pass()));
        let released: Option<ReconcileReport> =
            log_job("release_pass", self.drain(|r| r.release_pass()));
        let tiers: Option<TierScanReport> = log_job("tier_scan", self.engine.graph().tier_scan());

        let report: CycleReport = CycleReport {
            validated,
            released,
            tiers,
        };
        info!(
            validated = validated.map_or(0, |r| r.advanced),
            released = released.map_or(0, |r| r.advanced),
            tier_bonuses = tiers.map_or(0, |r| r.paid),
            failed_jobs = report.failed_jobs(),
            "Cycle finished"
        );
        report
    }

    /// Repeats a pass while it keeps returning full pages.
    fn drain<F>(&self, pass: F) -> Result<ReconcileReport, CoreError>
    where
        F: Fn(&Reconciler<S>) -> Result<ReconcileReport, CoreError>,
    {
        let mut total: ReconcileReport = ReconcileReport::default();
        for _ in 0..MAX_PAGES_PER_PASS {
            let page: ReconcileReport = pass(&self.reconciler)?;
            total.scanned += page.scanned;
            total.advanced += page.advanced;
            total.skipped += page.skipped;
            total.failed += page.failed;
            total.referrers += page.referrers;
            if page.scanned < self.reconciler.page_size() {
                break;
            }
        }
        Ok(total)
    }
}

fn log_job<T>(job: &str, result: Result<T, CoreError>) -> Option<T> {
    match result {
        Ok(report) => Some(report),
        Err(err) => {
            error!(job, error = %err, "Job failed");
            None
        }
    }
}
