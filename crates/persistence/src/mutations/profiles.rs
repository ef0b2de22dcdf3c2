// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::prelude::*;
use diesel::SqliteConnection;
use tracing::debug;

use affilink_domain::AffiliateProfile;

use super::require_updated;
use crate::data_models::{NewProfile, NewProfileCode, to_document};
use crate::diesel_schema::{profile_codes, profiles};
use crate::error::PersistenceError;

/// Inserts a profile and registers each of its codes.
///
/// # Errors
///
/// Returns `Duplicate` if the profile id or any code is already taken.
pub fn insert_profile(
    conn: &mut SqliteConnection,
    profile: &AffiliateProfile,
) -> Result<(), PersistenceError> {
    let row: NewProfile<'_> = NewProfile::from_profile(profile)?;
    diesel::insert_into(profiles::table)
        .values(&row)
        .execute(conn)
        .map_err(PersistenceError::on_unique("profile", profile.id.as_str()))?;

    for code in &profile.codes {
        diesel::insert_into(profile_codes::table)
            .values(&NewProfileCode {
                slot: code.slot.as_str(),
                code: &code.code,
                profile_id: profile.id.as_str(),
            })
            .execute(conn)
            .map_err(PersistenceError::on_unique("referral code", code.code.as_str()))?;
    }

    debug!(profile_id = %profile.id, codes = profile.codes.len(), "Inserted profile");
    Ok(())
}

/// Replaces a profile document and its derived columns.
///
/// # Errors
///
/// Returns `NotFound` if the profile does not exist.
pub fn update_profile(
    conn: &mut SqliteConnection,
    profile: &AffiliateProfile,
) -> Result<(), PersistenceError> {
    let affected: usize = diesel::update(profiles::table)
        .filter(profiles::profile_id.eq(profile.id.as_str()))
        .set((
            profiles::email.eq(&profile.email),
            profiles::qualified_referrals.eq(i64::from(profile.stats.qualified_referrals)),
            profiles::document.eq(to_document(profile)?),
        ))
        .execute(conn)?;
    require_updated(affected, "profile", profile.id.as_str())
}
