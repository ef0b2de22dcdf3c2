// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::prelude::*;
use diesel::SqliteConnection;
use tracing::debug;

use affilink_audit::AuditEvent;
use affilink_domain::{AffiliateConfig, FraudAlert};

use crate::data_models::{ConfigRow, NewAuditEvent, NewFraudAlert};
use crate::diesel_schema::{affiliate_config, audit_events, fraud_alerts};
use crate::error::PersistenceError;

/// Writes the config document, replacing the previous version.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub fn put_config(
    conn: &mut SqliteConnection,
    config: &AffiliateConfig,
) -> Result<(), PersistenceError> {
    diesel::replace_into(affiliate_config::table)
        .values(&ConfigRow::from_config(config)?)
        .execute(conn)?;
    debug!(version = config.version, "Stored affiliate config");
    Ok(())
}

/// Appends a fraud alert.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub fn insert_fraud_alert(
    conn: &mut SqliteConnection,
    alert: &FraudAlert,
) -> Result<(), PersistenceError> {
    diesel::insert_into(fraud_alerts::table)
        .values(&NewFraudAlert::from_alert(alert)?)
        .execute(conn)?;
    Ok(())
}

/// Appends an audit event.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub fn append_audit_event(
    conn: &mut SqliteConnection,
    event: &AuditEvent,
) -> Result<(), PersistenceError> {
    diesel::insert_into(audit_events::table)
        .values(&NewAuditEvent::from_event(event)?)
        .execute(conn)?;
    debug!(
        entity_type = %event.entity.entity_type,
        entity_id = %event.entity.entity_id,
        action = %event.action.name,
        "Appended audit event"
    );
    Ok(())
}
