// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use crate::context::EngineContext;
use crate::error::CoreError;
use crate::ledger::load_profile;
use crate::store::LedgerStore;
use affilink_domain::{
    AffiliateConfig, AffiliateProfile, CodeSlot, PendingReferral, ProfileId, ProfileKind,
    SharedSignal, WindowCheck, check_attribution_window, normalize_code, shared_signals,
};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// A referral code matched to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCode {
    pub referrer_id: ProfileId,
    pub referrer_kind: ProfileKind,
    pub slot: CodeSlot,
    /// The normalized code.
    pub code: String,
}

/// Why a pending referral was not attributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributionRejection {
    /// The referral carried no capture timestamp.
    MissingCaptureTime,
    Expired,
    UnknownCode,
    SelfReferral,
    /// Referrer and referee share identifying signals.
    SharedSignals {
        signals: Vec<SharedSignal>,
        severity: u8,
    },
    ReferrerInactive,
}

impl AttributionRejection {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCaptureTime => "missing_capture_time",
            Self::Expired => "expired",
            Self::UnknownCode => "unknown_code",
            Self::SelfReferral => "self_referral",
            Self::SharedSignals { .. } => "shared_signals",
            Self::ReferrerInactive => "referrer_inactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributionDecision {
    Attributed {
        code: ResolvedCode,
        captured_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    },
    NotAttributed(AttributionRejection),
}

/// Resolves referral codes and decides whether a signup is attributed.
pub struct AttributionResolver<S> {
    ctx: EngineContext<S>,
}

impl<S: LedgerStore> AttributionResolver<S> {
    #[must_use]
    pub const fn new(ctx: EngineContext<S>) -> Self {
        Self { ctx }
    }

    /// Looks a code up in every slot, in priority order.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn resolve_code(&self, code: &str) -> Result<Option<ResolvedCode>, CoreError> {
        let code: String = normalize_code(code);
        if code.is_empty() {
            return Ok(None);
        }
        self.ctx
            .store
            .run_transaction(|tx| -> Result<_, CoreError> {
                for slot in CodeSlot::PRIORITY {
                    if let Some(referrer_id) = tx.find_profile_by_code(slot, &code)? {
                        let referrer: AffiliateProfile = load_profile(tx, &referrer_id)?;
                        return Ok(Some(ResolvedCode {
                            referrer_id,
                            referrer_kind: referrer.kind,
                            slot,
                            code: code.clone(),
                        }));
                    }
                }
                Ok(None)
            })
    }

    /// Decides whether `referee` is attributed to the owner of the pending code.
    ///
    /// Fails closed: a referral without a capture time is never attributed.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn attribute(
        &self,
        pending: &PendingReferral,
        referee: &AffiliateProfile,
    ) -> Result<AttributionDecision, CoreError> {
        let config: Arc<AffiliateConfig> = self.ctx.config.get_config()?;
        let now: OffsetDateTime = self.ctx.now();

        let (captured_at, expires_at) = match check_attribution_window(
            pending.captured_at,
            now,
            config.attribution_window_days,
        ) {
            WindowCheck::Within {
                captured_at,
                expires_at,
            } => (captured_at, expires_at),
            WindowCheck::Expired => return Ok(reject(AttributionRejection::Expired)),
            WindowCheck::MissingCaptureTime => {
                return Ok(reject(AttributionRejection::MissingCaptureTime));
            }
        };

        let Some(code) = self.resolve_code(&pending.code)? else {
            return Ok(reject(AttributionRejection::UnknownCode));
        };
        if code.referrer_id == referee.id {
            return Ok(reject(AttributionRejection::SelfReferral));
        }

        let referrer: AffiliateProfile = self
            .ctx
            .store
            .run_transaction(|tx| -> Result<_, CoreError> { load_profile(tx, &code.referrer_id) })?;
        if !referrer.is_active() {
            return Ok(reject(AttributionRejection::ReferrerInactive));
        }

        let (signals, severity) = shared_signals(&referrer, &referee.email, &referee.signup);
        if !signals.is_empty() && severity >= config.fraud.self_referral_severity {
            warn!(
                referee_id = %referee.id,
                referrer_id = %referrer.id,
                severity,
                "Self-referral suspected"
            );
            return Ok(reject(AttributionRejection::SharedSignals { signals, severity }));
        }

        debug!(
            referee_id = %referee.id,
            referrer_id = %code.referrer_id,
            slot = code.slot.as_str(),
            "Referral attributed"
        );
        Ok(AttributionDecision::Attributed {
            code,
            captured_at,
            expires_at,
        })
    }
}

fn reject(reason: AttributionRejection) -> AttributionDecision {
    debug!(reason = reason.as_str(), "Referral not attributed");
    AttributionDecision::NotAttributed(reason)
}
