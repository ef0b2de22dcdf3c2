// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::prelude::*;
use diesel::SqliteConnection;

use affilink_domain::{Commission, SourceKey};

use super::require_updated;
use crate::data_models::{NewCommission, timestamp_ns, to_document};
use crate::diesel_schema::commissions;
use crate::error::PersistenceError;

fn describe_key(key: &SourceKey) -> String {
    format!(
        "{}/{}/{}/{}",
        key.referrer_id,
        key.referee_id,
        key.commission_type.as_str(),
        key.dedupe_key
    )
}

/// Inserts a commission.
///
/// # Errors
///
/// Returns `Duplicate` if a commission with the same source key exists.
pub fn insert_commission(
    conn: &mut SqliteConnection,
    commission: &Commission,
) -> Result<(), PersistenceError> {
    let row: NewCommission<'_> = NewCommission::from_commission(commission)?;
    diesel::insert_into(commissions::table)
        .values(&row)
        .execute(conn)
        .map_err(PersistenceError::on_unique(
            "commission",
            describe_key(&commission.source_key()),
        ))?;
    Ok(())
}

/// Replaces a commission document and its status and schedule columns.
///
/// # Errors
///
/// Returns `NotFound` if the commission does not exist.
pub fn update_commission(
    conn: &mut SqliteConnection,
    commission: &Commission,
) -> Result<(), PersistenceError> {
    let affected: usize = diesel::update(commissions::table)
        .filter(commissions::commission_id.eq(commission.id.as_str()))
        .set((
            commissions::status.eq(commission.status.as_str()),
            commissions::hold_until_ns.eq(timestamp_ns(commission.hold_until)?),
            commissions::available_at_ns.eq(timestamp_ns(commission.available_at)?),
            commissions::document.eq(to_document(commission)?),
        ))
        .execute(conn)?;
    require_updated(affected, "commission", commission.id.as_str())
}
