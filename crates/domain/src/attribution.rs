// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Attribution window and self-referral rules.

use crate::profile::{AffiliateProfile, SignupSignals};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// A referral code captured before signup (e.g. from a landing page).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReferral {
    pub code: String,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub captured_at: Option<OffsetDateTime>,
}

/// Outcome of the attribution window check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCheck {
    /// The capture is recent enough. Carries the capture time and deadline.
    Within {
        captured_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    },
    /// More than the window elapsed since capture.
    Expired,
    /// No capture timestamp exists; treated as expired.
    MissingCaptureTime,
}

impl WindowCheck {
    #[must_use]
    pub const fn is_within(&self) -> bool {
        matches!(self, Self::Within { .. })
    }
}

/// Checks the attribution window.
///
/// A capture exactly `window_days` old is still within the window; only
/// strictly more elapsed time expires it.
#[must_use]
pub fn check_attribution_window(
    captured_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
    window_days: u32,
) -> WindowCheck {
    let Some(captured_at) = captured_at else {
        return WindowCheck::MissingCaptureTime;
    };
    let window: Duration = Duration::days(i64::from(window_days));
    if now - captured_at > window {
        return WindowCheck::Expired;
    }
    WindowCheck::Within {
        captured_at,
        expires_at: captured_at.saturating_add(window),
    }
}

/// A signal shared between referrer and referee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedSignal {
    SameEmail,
    SameDevice,
    SameIp,
}

impl SharedSignal {
    /// Severity contributed by this signal.
    #[must_use]
    pub const fn severity(&self) -> u8 {
        match self {
            Self::SameEmail => 100,
            Self::SameDevice => 70,
            Self::SameIp => 50,
        }
    }
}

/// Canonical mailbox form: lowercase, `+tag` stripped from the local part.
#[must_use]
pub fn canonical_email(email: &str) -> String {
    let lowered: String = email.trim().to_lowercase();
    match lowered.split_once('@') {
        Some((local, domain)) => {
            let local: &str = local.split('+').next().unwrap_or(local);
            format!("{local}@{domain}")
        }
        None => lowered,
    }
}

/// Collects the signals a referee shares with the referrer and their combined
/// severity, capped at 100.
#[must_use]
pub fn shared_signals(
    referrer: &AffiliateProfile,
    referee_email: &str,
    referee_signals: &SignupSignals,
) -> (Vec<SharedSignal>, u8) {
    let mut signals: Vec<SharedSignal> = Vec::new();
    if canonical_email(&referrer.email) == canonical_email(referee_email) {
        signals.push(SharedSignal::SameEmail);
    }
    if same_value(
        referrer.signup.device_fingerprint.as_deref(),
        referee_signals.device_fingerprint.as_deref(),
    ) {
        signals.push(SharedSignal::SameDevice);
    }
    if same_value(
        referrer.signup.ip_address.as_deref(),
        referee_signals.ip_address.as_deref(),
    ) {
        signals.push(SharedSignal::SameIp);
    }
    let severity: u32 = signals.iter().map(|s| u32::from(s.severity())).sum();
    (signals, u8::try_from(severity.min(100)).unwrap_or(100))
}

fn same_value(a: Option<&str>, b: Option<&str>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if !a.is_empty() && a == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const WINDOW_DAYS: u32 = 30;

    fn now() -> OffsetDateTime {
        datetime!(2026-06-01 12:00 UTC)
    }

    #[test]
    fn test_just_inside_window_is_attributed() {
        let captured: OffsetDateTime = now() - (Duration::days(29) + Duration::hours(23) + Duration::minutes(59));
        assert!(check_attribution_window(Some(captured), now(), WINDOW_DAYS).is_within());
    }

    #[test]
    fn test_exact_boundary_is_attributed() {
        let captured: OffsetDateTime = now() - Duration::days(30);
        assert!(check_attribution_window(Some(captured), now(), WINDOW_DAYS).is_within());
    }

    #[test]
    fn test_just_past_window_is_expired() {
        let captured: OffsetDateTime = now() - (Duration::days(30) + Duration::minutes(1));
        assert_eq!(
            check_attribution_window(Some(captured), now(), WINDOW_DAYS),
            WindowCheck::Expired
        );
    }

    #[test]
    fn test_thirty_one_days_is_expired() {
        let captured: OffsetDateTime = now() - Duration::days(31);
        assert_eq!(
            check_attribution_window(Some(captured), now(), WINDOW_DAYS),
            WindowCheck::Expired
        );
    }

    #[test]
    fn test_missing_capture_time_fails_closed() {
        assert_eq!(
            check_attribution_window(None, now(), WINDOW_DAYS),
            WindowCheck::MissingCaptureTime
        );
    }

    #[test]
    fn test_expiry_deadline_is_reported() {
        let captured: OffsetDateTime = now() - Duration::days(10);
        assert_eq!(
            check_attribution_window(Some(captured), now(), WINDOW_DAYS),
            WindowCheck::Within {
                captured_at: captured,
                expires_at: captured + Duration::days(30)
            }
        );
    }

    #[test]
    fn test_canonical_email_strips_tags() {
        assert_eq!(canonical_email(" Alice+promo@Example.com "), "alice@example.com");
    }
}
