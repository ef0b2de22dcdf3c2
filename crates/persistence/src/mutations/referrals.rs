// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::prelude::*;
use diesel::SqliteConnection;

use affilink_domain::Referral;

use crate::data_models::NewReferral;
use crate::diesel_schema::referrals;
use crate::error::PersistenceError;

/// Inserts or replaces the edge keyed by `(referee_id, scheme)`.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub fn upsert_referral(
    conn: &mut SqliteConnection,
    referral: &Referral,
) -> Result<(), PersistenceError> {
    diesel::replace_into(referrals::table)
        .values(&NewReferral::from_referral(referral)?)
        .execute(conn)?;
    Ok(())
}
