// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Row shapes written to the database and the document codec they share.

use diesel::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;

use affilink_audit::AuditEvent;
use affilink_domain::{AffiliateConfig, AffiliateProfile, Commission, FraudAlert, Referral, Withdrawal};

use crate::diesel_schema::{
    affiliate_config, audit_events, commissions, fraud_alerts, profile_codes, profiles, referrals,
    withdrawals,
};
use crate::error::PersistenceError;

/// The single row id of the config table.
pub const CONFIG_ROW_ID: i32 = 1;

/// Serializes a domain document for a `document` column.
///
/// # Errors
///
/// Returns `SerializationError` if encoding fails.
pub fn to_document<T: Serialize>(value: &T) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string(value)?)
}

/// Decodes a `document` column.
///
/// # Errors
///
/// Returns `SerializationError` if the stored JSON does not match `T`.
pub fn from_document<T: DeserializeOwned>(document: &str) -> Result<T, PersistenceError> {
    Ok(serde_json::from_str(document)?)
}

/// Unix nanoseconds, the representation of every timestamp column.
///
/// # Errors
///
/// Returns `InvalidTimestamp` outside the range an `i64` can hold.
pub fn timestamp_ns(at: OffsetDateTime) -> Result<i64, PersistenceError> {
    i64::try_from(at.unix_timestamp_nanos())
        .map_err(|_| PersistenceError::InvalidTimestamp(at.to_string()))
}

#[derive(Debug, Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfile<'a> {
    pub profile_id: &'a str,
    pub kind: &'a str,
    pub email: &'a str,
    pub signup_ip: Option<&'a str>,
    pub signup_device: Option<&'a str>,
    pub qualified_referrals: i64,
    pub created_at_ns: i64,
    pub document: String,
}

impl<'a> NewProfile<'a> {
    /// # Errors
    ///
    /// Returns an error if the profile cannot be encoded.
    pub fn from_profile(profile: &'a AffiliateProfile) -> Result<Self, PersistenceError> {
        Ok(Self {
            profile_id: profile.id.as_str(),
            kind: profile.kind.as_str(),
            email: &profile.email,
            signup_ip: profile.signup.ip_address.as_deref(),
            signup_device: profile.signup.device_fingerprint.as_deref(),
            qualified_referrals: i64::from(profile.stats.qualified_referrals),
            created_at_ns: timestamp_ns(profile.created_at)?,
            document: to_document(profile)?,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = profile_codes)]
pub struct NewProfileCode<'a> {
    pub slot: &'a str,
    pub code: &'a str,
    pub profile_id: &'a str,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = commissions)]
pub struct NewCommission<'a> {
    pub commission_id: &'a str,
    pub referrer_id: &'a str,
    pub referee_id: &'a str,
    pub commission_type: &'a str,
    pub dedupe_key: &'a str,
    pub status: &'a str,
    pub created_at_ns: i64,
    pub hold_until_ns: i64,
    pub available_at_ns: i64,
    pub document: String,
}

impl<'a> NewCommission<'a> {
    /// # Errors
    ///
    /// Returns an error if the commission cannot be encoded.
    pub fn from_commission(commission: &'a Commission) -> Result<Self, PersistenceError> {
        Ok(Self {
            commission_id: commission.id.as_str(),
            referrer_id: commission.referrer_id.as_str(),
            referee_id: commission.referee_id.as_str(),
            commission_type: commission.commission_type.as_str(),
            dedupe_key: &commission.dedupe_key,
            status: commission.status.as_str(),
            created_at_ns: timestamp_ns(commission.created_at)?,
            hold_until_ns: timestamp_ns(commission.hold_until)?,
            available_at_ns: timestamp_ns(commission.available_at)?,
            document: to_document(commission)?,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = referrals)]
pub struct NewReferral<'a> {
    pub referee_id: &'a str,
    pub scheme: &'a str,
    pub referrer_id: &'a str,
    pub attributed_at_ns: i64,
    pub document: String,
}

impl<'a> NewReferral<'a> {
    /// # Errors
    ///
    /// Returns an error if the edge cannot be encoded.
    pub fn from_referral(referral: &'a Referral) -> Result<Self, PersistenceError> {
        Ok(Self {
            referee_id: referral.referee_id.as_str(),
            scheme: referral.scheme.as_str(),
            referrer_id: referral.referrer_id.as_str(),
            attributed_at_ns: timestamp_ns(referral.attributed_at)?,
            document: to_document(referral)?,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = withdrawals)]
pub struct NewWithdrawal<'a> {
    pub withdrawal_id: &'a str,
    pub referrer_id: &'a str,
    pub status: &'a str,
    pub is_active: i32,
    pub created_at_ns: i64,
    pub document: String,
}

impl<'a> NewWithdrawal<'a> {
    /// # Errors
    ///
    /// Returns an error if the withdrawal cannot be encoded.
    pub fn from_withdrawal(withdrawal: &'a Withdrawal) -> Result<Self, PersistenceError> {
        Ok(Self {
            withdrawal_id: withdrawal.id.as_str(),
            referrer_id: withdrawal.referrer_id.as_str(),
            status: withdrawal.status.as_str(),
            is_active: i32::from(withdrawal.is_active()),
            created_at_ns: timestamp_ns(withdrawal.created_at)?,
            document: to_document(withdrawal)?,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = affiliate_config)]
pub struct ConfigRow {
    pub config_id: i32,
    pub version: i64,
    pub document: String,
}

impl ConfigRow {
    /// # Errors
    ///
    /// Returns an error if the config cannot be encoded or its version does
    /// not fit the column.
    pub fn from_config(config: &AffiliateConfig) -> Result<Self, PersistenceError> {
        Ok(Self {
            config_id: CONFIG_ROW_ID,
            version: i64::try_from(config.version).map_err(|_| {
                PersistenceError::SerializationError(format!(
                    "config version {} out of range",
                    config.version
                ))
            })?,
            document: to_document(config)?,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = fraud_alerts)]
pub struct NewFraudAlert<'a> {
    pub subject_id: &'a str,
    pub created_at_ns: i64,
    pub document: String,
}

impl<'a> NewFraudAlert<'a> {
    /// # Errors
    ///
    /// Returns an error if the alert cannot be encoded.
    pub fn from_alert(alert: &'a FraudAlert) -> Result<Self, PersistenceError> {
        Ok(Self {
            subject_id: alert.subject_id.as_str(),
            created_at_ns: timestamp_ns(alert.created_at)?,
            document: to_document(alert)?,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = audit_events)]
pub struct NewAuditEvent<'a> {
    pub entity_type: &'a str,
    pub entity_id: &'a str,
    pub action_name: &'a str,
    pub occurred_at_ns: i64,
    pub document: String,
}

impl<'a> NewAuditEvent<'a> {
    /// # Errors
    ///
    /// Returns an error if the event cannot be encoded.
    pub fn from_event(event: &'a AuditEvent) -> Result<Self, PersistenceError> {
        Ok(Self {
            entity_type: &event.entity.entity_type,
            entity_id: &event.entity.entity_id,
            action_name: &event.action.name,
            occurred_at_ns: timestamp_ns(event.occurred_at)?,
            document: to_document(event)?,
        })
    }
}
