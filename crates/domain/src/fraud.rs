// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Referral fraud scoring.
//!
//! The default scorer is a weighted sum over a handful of signup signals,
//! capped at 100. Thresholds come from `FraudSettings`.

use crate::attribution::canonical_email;
use crate::config::FraudSettings;
use crate::ids::ProfileId;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const SAME_IP_WEIGHT: u32 = 40;
const IP_VELOCITY_WEIGHT: u32 = 30;
const DISPOSABLE_EMAIL_WEIGHT: u32 = 25;
const SIMILAR_EMAIL_WEIGHT: u32 = 20;
const DEVICE_REUSE_WEIGHT: u32 = 35;

/// Signals gathered for one referred signup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudSignals {
    pub referee_email: String,
    pub referee_ip: Option<String>,
    pub referrer_ip: Option<String>,
    /// Signups from the referee's IP during the last hour, the referee included.
    pub signups_from_ip_last_hour: u32,
    /// Other profiles registered from the referee's device.
    pub device_reuse_count: u32,
    /// Emails of the referrer's most recent referees.
    pub recent_referee_emails: Vec<String>,
}

str_enum! {
    /// A discrete fraud indicator.
    pub enum FraudIssue: "fraud issue" {
        SameIpAsReferrer => "same_ip_as_referrer",
        IpVelocity => "ip_velocity",
        DisposableEmail => "disposable_email",
        SimilarEmails => "similar_emails",
        DeviceReuse => "device_reuse",
        ScoringUnavailable => "scoring_unavailable",
    }
}

str_enum! {
    /// What the fraud gate decided.
    pub enum FraudDecision: "fraud decision" {
        Allow => "allow",
        Review => "review",
        Block => "block",
    }
}

/// A risk score and the issues behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudAssessment {
    /// Risk score from 0 to 100.
    pub score: u8,
    pub issues: Vec<FraudIssue>,
}

impl FraudAssessment {
    /// Maps the score onto a decision.
    #[must_use]
    pub const fn decision(&self, settings: &FraudSettings) -> FraudDecision {
        if self.score >= settings.block_score {
            FraudDecision::Block
        } else if self.score >= settings.review_score {
            FraudDecision::Review
        } else {
            FraudDecision::Allow
        }
    }
}

/// A persisted fraud alert. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudAlert {
    /// The profile the alert concerns.
    pub subject_id: ProfileId,
    pub referrer_id: Option<ProfileId>,
    pub score: u8,
    pub issues: Vec<FraudIssue>,
    pub decision: FraudDecision,
    /// Where the alert was raised, e.g. `signup` or `withdrawal`.
    pub context: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Scores a signup with the built-in weights.
#[must_use]
pub fn score_signals(signals: &FraudSignals, settings: &FraudSettings) -> FraudAssessment {
    let mut score: u32 = 0;
    let mut issues: Vec<FraudIssue> = Vec::new();

    if let (Some(referee), Some(referrer)) = (&signals.referee_ip, &signals.referrer_ip)
        && !referee.is_empty()
        && referee == referrer
    {
        score += SAME_IP_WEIGHT;
        issues.push(FraudIssue::SameIpAsReferrer);
    }

    if signals.signups_from_ip_last_hour > settings.max_signups_per_ip_per_hour {
        score += IP_VELOCITY_WEIGHT;
        issues.push(FraudIssue::IpVelocity);
    }

    if is_blocked_domain(&signals.referee_email, &settings.blocked_email_domains) {
        score += DISPOSABLE_EMAIL_WEIGHT;
        issues.push(FraudIssue::DisposableEmail);
    }

    if signals
        .recent_referee_emails
        .iter()
        .any(|other| email_similarity_percent(&signals.referee_email, other) >= settings.email_similarity_percent)
    {
        score += SIMILAR_EMAIL_WEIGHT;
        issues.push(FraudIssue::SimilarEmails);
    }

    if signals.device_reuse_count > 0 {
        score += DEVICE_REUSE_WEIGHT;
        issues.push(FraudIssue::DeviceReuse);
    }

    FraudAssessment {
        score: score.min(100).to_u8().unwrap_or(100),
        issues,
    }
}

/// True if the email's domain is in the blocked list.
#[must_use]
pub fn is_blocked_domain(email: &str, blocked: &[String]) -> bool {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim().to_lowercase())
        .is_some_and(|domain| blocked.iter().any(|b| b.eq_ignore_ascii_case(&domain)))
}

/// Similarity of two mailbox local parts, in percent.
///
/// Based on the Levenshtein distance relative to the longer local part.
#[must_use]
pub fn email_similarity_percent(a: &str, b: &str) -> u8 {
    let a: String = canonical_email(a);
    let b: String = canonical_email(b);
    let local_a: &str = a.split('@').next().unwrap_or_default();
    let local_b: &str = b.split('@').next().unwrap_or_default();
    let longest: usize = local_a.chars().count().max(local_b.chars().count());
    if longest == 0 {
        return 0;
    }
    let distance: usize = levenshtein(local_a, local_b);
    let similar: usize = longest.saturating_sub(distance) * 100 / longest;
    similar.to_u8().unwrap_or(100)
}

/// Edit distance between two strings, counted in characters.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current: Vec<usize> = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let substitution: usize = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> FraudSettings {
        FraudSettings::default()
    }

    #[test]
    fn test_clean_signup_scores_zero() {
        let signals: FraudSignals = FraudSignals {
            referee_email: String::from("new.client@example.com"),
            referee_ip: Some(String::from("10.0.0.2")),
            referrer_ip: Some(String::from("10.0.0.1")),
            signups_from_ip_last_hour: 1,
            ..FraudSignals::default()
        };
        let assessment: FraudAssessment = score_signals(&signals, &settings());

        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.decision(&settings()), FraudDecision::Allow);
    }

    #[test]
    fn test_same_ip_and_disposable_email_flags_for_review() {
        let signals: FraudSignals = FraudSignals {
            referee_email: String::from("someone@mailinator.com"),
            referee_ip: Some(String::from("10.0.0.1")),
            referrer_ip: Some(String::from("10.0.0.1")),
            ..FraudSignals::default()
        };
        let assessment: FraudAssessment = score_signals(&signals, &settings());

        assert_eq!(assessment.score, 65);
        assert_eq!(assessment.decision(&settings()), FraudDecision::Review);
        assert!(assessment.issues.contains(&FraudIssue::SameIpAsReferrer));
        assert!(assessment.issues.contains(&FraudIssue::DisposableEmail));
    }

    #[test]
    fn test_score_is_capped_and_blocks() {
        let signals: FraudSignals = FraudSignals {
            referee_email: String::from("john.doe2@yopmail.com"),
            referee_ip: Some(String::from("10.0.0.1")),
            referrer_ip: Some(String::from("10.0.0.1")),
            signups_from_ip_last_hour: 10,
            device_reuse_count: 2,
            recent_referee_emails: vec![String::from("john.doe1@example.com")],
        };
        let assessment: FraudAssessment = score_signals(&signals, &settings());

        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.decision(&settings()), FraudDecision::Block);
    }

    #[test]
    fn test_decision_thresholds_are_inclusive() {
        let at = |score: u8| FraudAssessment {
            score,
            issues: Vec::new(),
        };
        assert_eq!(at(80).decision(&settings()), FraudDecision::Block);
        assert_eq!(at(79).decision(&settings()), FraudDecision::Review);
        assert_eq!(at(50).decision(&settings()), FraudDecision::Review);
        assert_eq!(at(49).decision(&settings()), FraudDecision::Allow);
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_email_similarity() {
        assert_eq!(email_similarity_percent("a@x.com", "a@y.com"), 100);
        assert!(email_similarity_percent("john.doe1@x.com", "john.doe2@x.com") >= 80);
        assert!(email_similarity_percent("alice@x.com", "bob@x.com") < 50);
    }

    #[test]
    fn test_blocked_domain_is_case_insensitive() {
        let blocked: Vec<String> = vec![String::from("mailinator.com")];
        assert!(is_blocked_domain("x@Mailinator.COM", &blocked));
        assert!(!is_blocked_domain("x@example.com", &blocked));
    }
}
