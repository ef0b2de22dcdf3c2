// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! The affiliate recruitment tree: network commissions, threshold bonuses
//! and tier milestones.
//!
//! Every payout goes through [`CommissionLedger::create_commission`], so
//! the duplicate guard on the source key is what makes these operations
//! safe to repeat. Edge markers and `paid_tier_milestones` are written only
//! after the matching commission exists.

use crate::context::EngineContext;
use crate::error::CoreError;
use crate::ledger::{CommissionCreationResult, CommissionInput, CommissionLedger, load_profile};
use crate::store::LedgerStore;
use affilink_domain::{
    AffiliateConfig, AffiliateProfile, CommissionRule, CommissionType, EvaluationContext,
    ProfileId, Referral, ReferralScheme, ThresholdLevel, TierBonus, pending_thresholds,
    tier_source_id, unpaid_milestones,
};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// One commission attempt and its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegOutcome {
    pub commission_type: CommissionType,
    pub referrer_id: ProfileId,
    pub result: Result<CommissionCreationResult, CoreError>,
}

/// Counters from one `tier_scan` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierScanReport {
    pub profiles: usize,
    pub paid: usize,
    pub failed: usize,
}

pub struct ReferralGraph<S> {
    ctx: EngineContext<S>,
    ledger: CommissionLedger<S>,
}

impl<S: LedgerStore> ReferralGraph<S> {
    #[must_use]
    pub const fn new(ctx: EngineContext<S>, ledger: CommissionLedger<S>) -> Self {
        Self { ctx, ledger }
    }

    /// Pays the per-call commissions of the earner's recruiting parent and,
    /// once the parent unlocked it, grandparent.
    ///
    /// # Arguments
    ///
    /// * `earner_id` - The affiliate whose referee completed the call
    /// * `call_id` - The call, used as source id of every leg
    /// * `context` - Call facts for rule conditions
    ///
    /// # Errors
    ///
    /// Returns an error if the earner or the edges cannot be read. Failures
    /// of individual legs are reported inside the returned legs.
    pub fn network_commissions(
        &self,
        earner_id: &ProfileId,
        call_id: &str,
        context: &EvaluationContext,
    ) -> Result<Vec<LegOutcome>, CoreError> {
        let (parent_edge, grandparent_edge) = self
            .ctx
            .store
            .run_transaction(|tx| -> Result<_, CoreError> {
                let earner: AffiliateProfile = load_profile(tx, earner_id)?;
                let Some(parent_id) = earner.referred_by else {
                    return Ok((None, None));
                };
                let parent_edge: Option<Referral> = tx
                    .referral(earner_id, ReferralScheme::AffiliateRecruitment)?
                    .filter(|edge| edge.referrer_id == parent_id);
                let grandparent_edge: Option<Referral> = tx
                    .referral(&parent_id, ReferralScheme::AffiliateRecruitment)?
                    .filter(|edge| edge.n2_unlocked);
                Ok((parent_edge, grandparent_edge))
            })?;

        let mut legs: Vec<LegOutcome> = Vec::new();
        let Some(parent_edge) = parent_edge else {
            return Ok(legs);
        };
        legs.push(self.network_leg(
            CommissionType::N1Call,
            &parent_edge.referrer_id,
            earner_id,
            call_id,
            context,
        ));
        if let Some(grandparent_edge) = grandparent_edge {
            legs.push(self.network_leg(
                CommissionType::N2Call,
                &grandparent_edge.referrer_id,
                earner_id,
                call_id,
                context,
            ));
        }
        Ok(legs)
    }

    fn network_leg(
        &self,
        commission_type: CommissionType,
        referrer_id: &ProfileId,
        earner_id: &ProfileId,
        call_id: &str,
        context: &EvaluationContext,
    ) -> LegOutcome {
        let input: CommissionInput = CommissionInput::new(
            referrer_id.clone(),
            earner_id.clone(),
            commission_type,
            call_id,
        )
        .with_context(context.clone());
        let result = self.ledger.create_commission(&input);
        if let Err(err) = &result {
            warn!(
                referrer_id = %referrer_id,
                commission_type = commission_type.as_str(),
                error = %err,
                "Network commission failed"
            );
        }
        LegOutcome {
            commission_type,
            referrer_id: referrer_id.clone(),
            result,
        }
    }

    /// Pays threshold bonuses to the recruiter of `recruit_id` for every
    /// threshold the recruit's direct client earnings have crossed.
    ///
    /// # Errors
    ///
    /// Returns an error if the recruit or its edge cannot be read.
    pub fn check_thresholds(&self, recruit_id: &ProfileId) -> Result<Vec<LegOutcome>, CoreError> {
        let config: Arc<AffiliateConfig> = self.ctx.config.get_config()?;
        let found = self
            .ctx
            .store
            .run_transaction(|tx| -> Result<_, CoreError> {
                let recruit: AffiliateProfile = load_profile(tx, recruit_id)?;
                let edge: Option<Referral> =
                    tx.referral(recruit_id, ReferralScheme::AffiliateRecruitment)?;
                Ok(edge.map(|edge| (edge, recruit.stats.direct_client_earnings)))
            })?;
        let Some((edge, earnings)) = found else {
            return Ok(Vec::new());
        };

        let mut legs: Vec<LegOutcome> = Vec::new();
        for level in pending_thresholds(&edge, earnings, &config.referral_program) {
            let bonus = level.bonus(&config.referral_program);
            let commission_type: CommissionType = level.commission_type();
            let input: CommissionInput = CommissionInput::new(
                edge.referrer_id.clone(),
                recruit_id.clone(),
                commission_type,
                level.source_id(),
            )
            .with_rule(CommissionRule::fixed(bonus))
            .with_description(&format!("{} bonus for {recruit_id}", commission_type.as_str()));
            let result = self.ledger.create_commission(&input);

            let settled: bool = matches!(
                result,
                Ok(CommissionCreationResult::Created { .. }
                    | CommissionCreationResult::Duplicate { .. }
                    | CommissionCreationResult::ZeroAmount)
            );
            let result = if settled {
                self.mark_threshold(recruit_id, level).and(result)
            } else {
                result
            };
            if let Err(err) = &result {
                warn!(
                    recruit_id = %recruit_id,
                    level = ?level,
                    error = %err,
                    "Threshold bonus failed"
                );
            }
            legs.push(LegOutcome {
                commission_type,
                referrer_id: edge.referrer_id.clone(),
                result,
            });
        }
        Ok(legs)
    }

    /// Records a crossed threshold on the edge. Only the first marking of
    /// the first threshold counts towards the recruiter's qualified total.
    fn mark_threshold(&self, recruit_id: &ProfileId, level: ThresholdLevel) -> Result<(), CoreError> {
        let now: OffsetDateTime = self.ctx.now();
        self.ctx
            .store
            .run_transaction(|tx| -> Result<_, CoreError> {
                let Some(mut edge) =
                    tx.referral(recruit_id, ReferralScheme::AffiliateRecruitment)?
                else {
                    return Err(CoreError::not_found("referral", recruit_id));
                };
                match level {
                    ThresholdLevel::First => {
                        if edge.first_threshold_at.is_some() {
                            return Ok(());
                        }
                        edge.first_threshold_at = Some(now);
                        let mut recruiter: AffiliateProfile = load_profile(tx, &edge.referrer_id)?;
                        recruiter.stats.qualified_referrals =
                            recruiter.stats.qualified_referrals.saturating_add(1);
                        tx.put_profile(&recruiter)?;
                    }
                    ThresholdLevel::Second => {
                        if edge.second_threshold_at.is_some() {
                            return Ok(());
                        }
                        edge.second_threshold_at = Some(now);
                        edge.n2_unlocked = true;
                    }
                }
                tx.put_referral(&edge)?;
                info!(
                    recruit_id = %recruit_id,
                    referrer_id = %edge.referrer_id,
                    level = ?level,
                    "Recruit crossed threshold"
                );
                Ok(())
            })
    }

    /// Pays every reached and unpaid tier milestone once.
    ///
    /// # Errors
    ///
    /// Returns an error only if the candidate profiles cannot be listed.
    pub fn tier_scan(&self) -> Result<TierScanReport, CoreError> {
        let config: Arc<AffiliateConfig> = self.ctx.config.get_config()?;
        let candidates: Vec<ProfileId> = self
            .ctx
            .store
            .run_transaction(|tx| tx.profiles_with_qualified_referrals())?;

        let mut report = TierScanReport {
            profiles: candidates.len(),
            ..TierScanReport::default()
        };
        for profile_id in candidates {
            match self.pay_milestones(&profile_id, &config.referral_program.tier_bonuses) {
                Ok(paid) => report.paid += paid,
                Err(err) => {
                    report.failed += 1;
                    warn!(profile_id = %profile_id, error = %err, "Tier scan failed for profile");
                }
            }
        }
        info!(
            profiles = report.profiles,
            paid = report.paid,
            failed = report.failed,
            "Tier scan finished"
        );
        Ok(report)
    }

    fn pay_milestones(&self, profile_id: &ProfileId, tiers: &[TierBonus]) -> Result<usize, CoreError> {
        let profile: AffiliateProfile = self
            .ctx
            .store
            .run_transaction(|tx| -> Result<_, CoreError> { load_profile(tx, profile_id) })?;
        let mut paid: usize = 0;
        for tier in unpaid_milestones(
            profile.stats.qualified_referrals,
            &profile.paid_tier_milestones,
            tiers,
        ) {
            let input: CommissionInput = CommissionInput::new(
                profile_id.clone(),
                profile_id.clone(),
                CommissionType::TierBonus,
                &tier_source_id(tier.milestone),
            )
            .with_rule(CommissionRule::fixed(tier.amount))
            .with_description(&format!("tier bonus for {} qualified referrals", tier.milestone));
            let result: CommissionCreationResult = self.ledger.create_commission(&input)?;
            match result {
                CommissionCreationResult::Created { .. } => paid += 1,
                CommissionCreationResult::Duplicate { .. } | CommissionCreationResult::ZeroAmount => {}
                other => {
                    debug!(
                        profile_id = %profile_id,
                        milestone = tier.milestone,
                        outcome = other.label(),
                        "Tier bonus not paid"
                    );
                    continue;
                }
            }
            self.ctx
                .store
                .run_transaction(|tx| -> Result<_, CoreError> {
                    let mut profile: AffiliateProfile = load_profile(tx, profile_id)?;
                    if profile.paid_tier_milestones.insert(tier.milestone) {
                        tx.put_profile(&profile)?;
                    }
                    Ok(())
                })?;
        }
        Ok(paid)
    }
}
