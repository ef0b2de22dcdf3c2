// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::prelude::*;
use diesel::SqliteConnection;

use affilink_domain::Withdrawal;

use super::require_updated;
use crate::data_models::{NewWithdrawal, to_document};
use crate::diesel_schema::withdrawals;
use crate::error::PersistenceError;

/// Inserts a withdrawal.
///
/// # Errors
///
/// Returns `Duplicate` if the referrer already has an active withdrawal.
pub fn insert_withdrawal(
    conn: &mut SqliteConnection,
    withdrawal: &Withdrawal,
) -> Result<(), PersistenceError> {
    diesel::insert_into(withdrawals::table)
        .values(&NewWithdrawal::from_withdrawal(withdrawal)?)
        .execute(conn)
        .map_err(PersistenceError::on_unique(
            "active withdrawal",
            withdrawal.referrer_id.as_str(),
        ))?;
    Ok(())
}

/// Replaces a withdrawal document and its status columns.
///
/// # Errors
///
/// Returns `NotFound` if the withdrawal does not exist.
pub fn update_withdrawal(
    conn: &mut SqliteConnection,
    withdrawal: &Withdrawal,
) -> Result<(), PersistenceError> {
    let affected: usize = diesel::update(withdrawals::table)
        .filter(withdrawals::withdrawal_id.eq(withdrawal.id.as_str()))
        .set((
            withdrawals::status.eq(withdrawal.status.as_str()),
            withdrawals::is_active.eq(i32::from(withdrawal.is_active())),
            withdrawals::document.eq(to_document(withdrawal)?),
        ))
        .execute(conn)
        .map_err(PersistenceError::on_unique(
            "active withdrawal",
            withdrawal.referrer_id.as_str(),
        ))?;
    require_updated(affected, "withdrawal", withdrawal.id.as_str())
}
