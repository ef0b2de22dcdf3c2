// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::prelude::*;
use diesel::SqliteConnection;

use affilink_domain::{ProfileId, Referral, ReferralScheme};

use super::decode_all;
use crate::data_models::from_document;
use crate::diesel_schema::referrals;
use crate::error::PersistenceError;

/// Loads the edge of a referee in one scheme.
///
/// # Errors
///
/// Returns an error if the query fails or the document cannot be decoded.
pub fn get_referral(
    conn: &mut SqliteConnection,
    referee: &ProfileId,
    scheme: ReferralScheme,
) -> Result<Option<Referral>, PersistenceError> {
    let document: Option<String> = referrals::table
        .filter(referrals::referee_id.eq(referee.as_str()))
        .filter(referrals::scheme.eq(scheme.as_str()))
        .select(referrals::document)
        .first::<String>(conn)
        .optional()?;
    document.as_deref().map(from_document).transpose()
}

/// Edges pointing at a referrer, in attribution order.
///
/// # Errors
///
/// Returns an error if the query fails or a document cannot be decoded.
pub fn referrals_by_referrer(
    conn: &mut SqliteConnection,
    referrer: &ProfileId,
) -> Result<Vec<Referral>, PersistenceError> {
    let documents: Vec<String> = referrals::table
        .filter(referrals::referrer_id.eq(referrer.as_str()))
        .order((referrals::attributed_at_ns.asc(), referrals::referee_id.asc()))
        .select(referrals::document)
        .load::<String>(conn)?;
    decode_all(&documents)
}
