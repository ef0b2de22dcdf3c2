// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Fraud gate for referred signups and payouts.
//!
//! Scores never leave the engine: they are logged and persisted as alerts,
//! while callers only see the decision.

use crate::context::EngineContext;
use crate::error::CoreError;
use crate::store::{LedgerStore, LedgerTx};
use affilink_domain::{
    AffiliateConfig, AffiliateProfile, FraudAlert, FraudAssessment, FraudDecision, FraudIssue,
    FraudSettings, FraudSignals, FraudStatus, ProfileId, Referral, score_signals,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

/// How many of the referrer's latest referees are compared for similar emails.
const RECENT_REFEREE_SAMPLE: usize = 20;

/// A pluggable risk scorer.
pub trait FraudScorer: Send + Sync {
    /// Scores one referred signup.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure if scoring is not possible.
    fn score(
        &self,
        signals: &FraudSignals,
        settings: &FraudSettings,
    ) -> Result<FraudAssessment, String>;
}

/// The built-in weighted scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedScorer;

impl FraudScorer for RuleBasedScorer {
    fn score(
        &self,
        signals: &FraudSignals,
        settings: &FraudSettings,
    ) -> Result<FraudAssessment, String> {
        Ok(score_signals(signals, settings))
    }
}

/// The gate's verdict on a referred signup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    pub decision: FraudDecision,
    pub score: u8,
    /// Set when the scorer failed and the signup was let through for review.
    pub needs_manual_review: bool,
}

/// Payout-time fraud verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutCheck {
    pub requires_review: bool,
}

/// Checks whether a profile may request a payout.
///
/// # Errors
///
/// Returns `CoreError::PermissionDenied` with a generic message for blocked
/// profiles.
pub fn check_payout(profile: &AffiliateProfile) -> Result<PayoutCheck, CoreError> {
    match profile.fraud_status {
        FraudStatus::Blocked => Err(CoreError::PermissionDenied(String::from(
            "withdrawals are not available for this account",
        ))),
        FraudStatus::UnderReview => Ok(PayoutCheck {
            requires_review: true,
        }),
        FraudStatus::Clear => Ok(PayoutCheck {
            requires_review: false,
        }),
    }
}

pub struct FraudGate<S> {
    ctx: EngineContext<S>,
    scorer: Arc<dyn FraudScorer>,
}

impl<S: LedgerStore> FraudGate<S> {
    #[must_use]
    pub fn new(ctx: EngineContext<S>, scorer: Arc<dyn FraudScorer>) -> Self {
        Self { ctx, scorer }
    }

    /// Scores a referred signup and persists an alert for anything but `Allow`.
    ///
    /// Scorer failures fail open: the signup is allowed through as `Review`
    /// with `needs_manual_review` set.
    ///
    /// # Errors
    ///
    /// Returns a store error if signals cannot be gathered or the alert
    /// cannot be written.
    pub fn check_signup(
        &self,
        referee: &AffiliateProfile,
        referrer: &AffiliateProfile,
    ) -> Result<GateOutcome, CoreError> {
        let config: Arc<AffiliateConfig> = self.ctx.config.get_config()?;
        if !config.fraud.enabled {
            return Ok(GateOutcome {
                decision: FraudDecision::Allow,
                score: 0,
                needs_manual_review: false,
            });
        }
        let now: OffsetDateTime = self.ctx.now();
        let signals: FraudSignals = self
            .ctx
            .store
            .run_transaction(|tx| -> Result<_, CoreError> {
                gather_signals(tx, referee, referrer, now)
            })?;

        let (assessment, needs_manual_review) = match self.scorer.score(&signals, &config.fraud) {
            Ok(assessment) => (assessment, false),
            Err(reason) => {
                warn!(
                    referee_id = %referee.id,
                    reason = %reason,
                    "Fraud scoring failed, allowing signup for manual review"
                );
                (
                    FraudAssessment {
                        score: 0,
                        issues: vec![FraudIssue::ScoringUnavailable],
                    },
                    true,
                )
            }
        };
        let decision: FraudDecision = if needs_manual_review {
            FraudDecision::Review
        } else {
            assessment.decision(&config.fraud)
        };

        if decision != FraudDecision::Allow {
            warn!(
                referee_id = %referee.id,
                referrer_id = %referrer.id,
                score = assessment.score,
                issues = ?assessment.issues,
                decision = decision.as_str(),
                "Fraud gate flagged signup"
            );
            let alert: FraudAlert = FraudAlert {
                subject_id: referee.id.clone(),
                referrer_id: Some(referrer.id.clone()),
                score: assessment.score,
                issues: assessment.issues.clone(),
                decision,
                context: String::from("signup"),
                created_at: now,
            };
            self.ctx
                .store
                .run_transaction(|tx| tx.insert_fraud_alert(&alert))?;
        } else {
            info!(referee_id = %referee.id, "Fraud gate allowed signup");
        }

        Ok(GateOutcome {
            decision,
            score: assessment.score,
            needs_manual_review,
        })
    }

    /// Alerts recorded for a profile.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn alerts_for(&self, subject: &ProfileId) -> Result<Vec<FraudAlert>, CoreError> {
        Ok(self
            .ctx
            .store
            .run_transaction(|tx| tx.fraud_alerts_for(subject))?)
    }
}

fn gather_signals(
    tx: &mut dyn LedgerTx,
    referee: &AffiliateProfile,
    referrer: &AffiliateProfile,
    now: OffsetDateTime,
) -> Result<FraudSignals, CoreError> {
    let signups_from_ip_last_hour: u32 = match referee.signup.ip_address.as_deref() {
        Some(ip) if !ip.is_empty() => tx
            .count_profiles_by_ip_since(ip, now - Duration::hours(1), &referee.id)?
            .saturating_add(1),
        _ => 0,
    };
    let device_reuse_count: u32 = match referee.signup.device_fingerprint.as_deref() {
        Some(device) if !device.is_empty() => tx.count_profiles_by_device(device, &referee.id)?,
        _ => 0,
    };

    let referrals: Vec<Referral> = tx.referrals_by_referrer(&referrer.id)?;
    let mut recent_referee_emails: Vec<String> = Vec::new();
    for referral in referrals.iter().rev().take(RECENT_REFEREE_SAMPLE) {
        if referral.referee_id == referee.id {
            continue;
        }
        if let Some(profile) = tx.profile(&referral.referee_id)? {
            recent_referee_emails.push(profile.email);
        }
    }

    Ok(FraudSignals {
        referee_email: referee.email.clone(),
        referee_ip: referee.signup.ip_address.clone(),
        referrer_ip: referrer.signup.ip_address.clone(),
        signups_from_ip_last_hour,
        device_reuse_count,
        recent_referee_emails,
    })
}
