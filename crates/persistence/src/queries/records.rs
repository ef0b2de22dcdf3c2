// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::prelude::*;
use diesel::SqliteConnection;

use affilink_audit::AuditEvent;
use affilink_domain::{AffiliateConfig, FraudAlert, ProfileId};

use super::decode_all;
use crate::data_models::{CONFIG_ROW_ID, from_document};
use crate::diesel_schema::{affiliate_config, audit_events, fraud_alerts};
use crate::error::PersistenceError;

/// Loads the config document, if one was ever written.
///
/// # Errors
///
/// Returns an error if the query fails or the document cannot be decoded.
pub fn get_config(conn: &mut SqliteConnection) -> Result<Option<AffiliateConfig>, PersistenceError> {
    let document: Option<String> = affiliate_config::table
        .filter(affiliate_config::config_id.eq(CONFIG_ROW_ID))
        .select(affiliate_config::document)
        .first::<String>(conn)
        .optional()?;
    document.as_deref().map(from_document).transpose()
}

/// Fraud alerts raised for a profile, in the order they were recorded.
///
/// # Errors
///
/// Returns an error if the query fails or a document cannot be decoded.
pub fn fraud_alerts_for(
    conn: &mut SqliteConnection,
    subject: &ProfileId,
) -> Result<Vec<FraudAlert>, PersistenceError> {
    let documents: Vec<String> = fraud_alerts::table
        .filter(fraud_alerts::subject_id.eq(subject.as_str()))
        .order(fraud_alerts::alert_id.asc())
        .select(fraud_alerts::document)
        .load::<String>(conn)?;
    decode_all(&documents)
}

/// Audit events of one entity, in commit order.
///
/// # Errors
///
/// Returns an error if the query fails or a document cannot be decoded.
pub fn audit_events_for(
    conn: &mut SqliteConnection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<AuditEvent>, PersistenceError> {
    let documents: Vec<String> = audit_events::table
        .filter(audit_events::entity_type.eq(entity_type))
        .filter(audit_events::entity_id.eq(entity_id))
        .order(audit_events::event_id.asc())
        .select(audit_events::document)
        .load::<String>(conn)?;
    decode_all(&documents)
}
