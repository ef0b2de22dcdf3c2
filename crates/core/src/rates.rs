// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use affilink_domain::{AffiliateConfig, AffiliateProfile, CapturedRates};
use time::OffsetDateTime;

/// Snapshots the config's current rate card.
#[must_use]
pub const fn capture_rates(config: &AffiliateConfig, now: OffsetDateTime) -> CapturedRates {
    CapturedRates {
        rates: config.rates,
        captured_at: now,
        config_version: config.version,
    }
}

/// Captures rates onto a referrer profile that has none yet.
///
/// Returns false, leaving the profile untouched, if a snapshot already
/// exists or the profile kind does not earn referral commissions.
pub fn ensure_captured(
    profile: &mut AffiliateProfile,
    config: &AffiliateConfig,
    now: OffsetDateTime,
) -> bool {
    if profile.captured_rates.is_some() || !profile.kind.is_affiliate() {
        return false;
    }
    profile.captured_rates = Some(capture_rates(config, now));
    true
}
