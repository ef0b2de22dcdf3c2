// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::prelude::*;
use diesel::SqliteConnection;
use time::OffsetDateTime;

use affilink::DueCursor;
use affilink_domain::{
    Commission, CommissionId, CommissionStatus, CommissionType, ProfileId, SourceKey,
};

use super::{decode_all, to_count};
use crate::data_models::{from_document, timestamp_ns};
use crate::diesel_schema::commissions;
use crate::error::PersistenceError;

/// Loads a commission document.
///
/// # Errors
///
/// Returns an error if the query fails or the document cannot be decoded.
pub fn get_commission(
    conn: &mut SqliteConnection,
    id: &CommissionId,
) -> Result<Option<Commission>, PersistenceError> {
    let document: Option<String> = commissions::table
        .filter(commissions::commission_id.eq(id.as_str()))
        .select(commissions::document)
        .first::<String>(conn)
        .optional()?;
    document.as_deref().map(from_document).transpose()
}

/// Looks a commission up by its idempotency key.
///
/// # Errors
///
/// Returns an error if the query fails or the document cannot be decoded.
pub fn find_commission_by_source(
    conn: &mut SqliteConnection,
    key: &SourceKey,
) -> Result<Option<Commission>, PersistenceError> {
    let document: Option<String> = commissions::table
        .filter(commissions::referrer_id.eq(key.referrer_id.as_str()))
        .filter(commissions::referee_id.eq(key.referee_id.as_str()))
        .filter(commissions::commission_type.eq(key.commission_type.as_str()))
        .filter(commissions::dedupe_key.eq(&key.dedupe_key))
        .select(commissions::document)
        .first::<String>(conn)
        .optional()?;
    document.as_deref().map(from_document).transpose()
}

/// Commissions in `status` whose next transition is due, oldest due first.
///
/// Pending commissions are due at `hold_until`, validated ones at
/// `available_at`.
///
/// # Errors
///
/// Returns an error if the query fails or a document cannot be decoded.
pub fn due_commissions(
    conn: &mut SqliteConnection,
    status: CommissionStatus,
    now: OffsetDateTime,
    after: Option<&DueCursor>,
    limit: usize,
) -> Result<Vec<Commission>, PersistenceError> {
    let now_ns: i64 = timestamp_ns(now)?;
    let after: Option<(i64, String)> = match after {
        Some(cursor) => Some((timestamp_ns(cursor.due_at)?, cursor.id.as_str().to_string())),
        None => None,
    };
    let limit: i64 = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut query = commissions::table
        .filter(commissions::status.eq(status.as_str()))
        .select(commissions::document)
        .into_boxed();
    if status == CommissionStatus::Validated {
        query = query
            .filter(commissions::available_at_ns.le(now_ns))
            .order((
                commissions::available_at_ns.asc(),
                commissions::commission_id.asc(),
            ));
        if let Some((due_ns, id)) = after {
            query = query.filter(
                commissions::available_at_ns.gt(due_ns).or(commissions::available_at_ns
                    .eq(due_ns)
                    .and(commissions::commission_id.gt(id))),
            );
        }
    } else {
        query = query
            .filter(commissions::hold_until_ns.le(now_ns))
            .order((
                commissions::hold_until_ns.asc(),
                commissions::commission_id.asc(),
            ));
        if let Some((due_ns, id)) = after {
            query = query.filter(
                commissions::hold_until_ns.gt(due_ns).or(commissions::hold_until_ns
                    .eq(due_ns)
                    .and(commissions::commission_id.gt(id))),
            );
        }
    }
    let documents: Vec<String> = query.limit(limit).load::<String>(conn)?;
    decode_all(&documents)
}

/// Commissions of a referrer in FIFO order, optionally narrowed to a status.
///
/// # Errors
///
/// Returns an error if the query fails or a document cannot be decoded.
pub fn commissions_for_referrer(
    conn: &mut SqliteConnection,
    referrer: &ProfileId,
    status: Option<CommissionStatus>,
) -> Result<Vec<Commission>, PersistenceError> {
    let mut query = commissions::table
        .filter(commissions::referrer_id.eq(referrer.as_str()))
        .order((
            commissions::created_at_ns.asc(),
            commissions::commission_id.asc(),
        ))
        .select(commissions::document)
        .into_boxed();
    if let Some(status) = status {
        query = query.filter(commissions::status.eq(status.as_str()));
    }
    let documents: Vec<String> = query.load::<String>(conn)?;
    decode_all(&documents)
}

/// Counts non-cancelled commissions of a type for a referrer.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_commissions(
    conn: &mut SqliteConnection,
    referrer: &ProfileId,
    commission_type: CommissionType,
    referee: Option<&ProfileId>,
    since: Option<OffsetDateTime>,
) -> Result<u32, PersistenceError> {
    let mut query = commissions::table
        .filter(commissions::referrer_id.eq(referrer.as_str()))
        .filter(commissions::commission_type.eq(commission_type.as_str()))
        .filter(commissions::status.ne(CommissionStatus::Cancelled.as_str()))
        .into_boxed();
    if let Some(referee) = referee {
        query = query.filter(commissions::referee_id.eq(referee.as_str()));
    }
    if let Some(since) = since {
        query = query.filter(commissions::created_at_ns.ge(timestamp_ns(since)?));
    }
    let count: i64 = query.count().get_result(conn)?;
    Ok(to_count(count))
}
