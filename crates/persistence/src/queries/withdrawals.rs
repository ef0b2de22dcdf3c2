// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::prelude::*;
use diesel::SqliteConnection;
use time::OffsetDateTime;

use affilink_domain::{ProfileId, Withdrawal, WithdrawalId, WithdrawalStatus};

use super::decode_all;
use crate::data_models::{from_document, timestamp_ns};
use crate::diesel_schema::withdrawals;
use crate::error::PersistenceError;

/// Loads a withdrawal document.
///
/// # Errors
///
/// Returns an error if the query fails or the document cannot be decoded.
pub fn get_withdrawal(
    conn: &mut SqliteConnection,
    id: &WithdrawalId,
) -> Result<Option<Withdrawal>, PersistenceError> {
    let document: Option<String> = withdrawals::table
        .filter(withdrawals::withdrawal_id.eq(id.as_str()))
        .select(withdrawals::document)
        .first::<String>(conn)
        .optional()?;
    document.as_deref().map(from_document).transpose()
}

/// The referrer's pending, approved or processing withdrawal.
///
/// # Errors
///
/// Returns an error if the query fails or the document cannot be decoded.
pub fn active_withdrawal(
    conn: &mut SqliteConnection,
    referrer: &ProfileId,
) -> Result<Option<Withdrawal>, PersistenceError> {
    let document: Option<String> = withdrawals::table
        .filter(withdrawals::referrer_id.eq(referrer.as_str()))
        .filter(withdrawals::is_active.eq(1))
        .select(withdrawals::document)
        .first::<String>(conn)
        .optional()?;
    document.as_deref().map(from_document).transpose()
}

/// Withdrawals a referrer created at or after `since`.
///
/// # Errors
///
/// Returns an error if the query fails or a document cannot be decoded.
pub fn withdrawals_since(
    conn: &mut SqliteConnection,
    referrer: &ProfileId,
    since: OffsetDateTime,
) -> Result<Vec<Withdrawal>, PersistenceError> {
    let documents: Vec<String> = withdrawals::table
        .filter(withdrawals::referrer_id.eq(referrer.as_str()))
        .filter(withdrawals::created_at_ns.ge(timestamp_ns(since)?))
        .order(withdrawals::created_at_ns.asc())
        .select(withdrawals::document)
        .load::<String>(conn)?;
    decode_all(&documents)
}

/// Withdrawals in one status, oldest first.
///
/// # Errors
///
/// Returns an error if the query fails or a document cannot be decoded.
pub fn withdrawals_by_status(
    conn: &mut SqliteConnection,
    status: WithdrawalStatus,
) -> Result<Vec<Withdrawal>, PersistenceError> {
    let documents: Vec<String> = withdrawals::table
        .filter(withdrawals::status.eq(status.as_str()))
        .order((
            withdrawals::created_at_ns.asc(),
            withdrawals::withdrawal_id.asc(),
        ))
        .select(withdrawals::document)
        .load::<String>(conn)?;
    decode_all(&documents)
}
