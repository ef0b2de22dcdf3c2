// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use diesel::prelude::*;
use diesel::SqliteConnection;
use time::OffsetDateTime;

use affilink_domain::{AffiliateProfile, CodeSlot, ProfileId};

use super::to_count;
use crate::data_models::{from_document, timestamp_ns};
use crate::diesel_schema::{profile_codes, profiles};
use crate::error::PersistenceError;

/// Loads a profile document.
///
/// # Errors
///
/// Returns an error if the query fails or the document cannot be decoded.
pub fn get_profile(
    conn: &mut SqliteConnection,
    id: &ProfileId,
) -> Result<Option<AffiliateProfile>, PersistenceError> {
    let document: Option<String> = profiles::table
        .filter(profiles::profile_id.eq(id.as_str()))
        .select(profiles::document)
        .first::<String>(conn)
        .optional()?;
    document.as_deref().map(from_document).transpose()
}

/// Finds the owner of a code in one slot.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_profile_by_code(
    conn: &mut SqliteConnection,
    slot: CodeSlot,
    code: &str,
) -> Result<Option<ProfileId>, PersistenceError> {
    let owner: Option<String> = profile_codes::table
        .filter(profile_codes::slot.eq(slot.as_str()))
        .filter(profile_codes::code.eq(code))
        .select(profile_codes::profile_id)
        .first::<String>(conn)
        .optional()?;
    Ok(owner.map(ProfileId::new))
}

/// Counts other profiles that signed up from `ip` at or after `since`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_profiles_by_ip_since(
    conn: &mut SqliteConnection,
    ip: &str,
    since: OffsetDateTime,
    exclude: &ProfileId,
) -> Result<u32, PersistenceError> {
    let count: i64 = profiles::table
        .filter(profiles::signup_ip.eq(ip))
        .filter(profiles::created_at_ns.ge(timestamp_ns(since)?))
        .filter(profiles::profile_id.ne(exclude.as_str()))
        .count()
        .get_result(conn)?;
    Ok(to_count(count))
}

/// Counts other profiles that signed up with `device`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_profiles_by_device(
    conn: &mut SqliteConnection,
    device: &str,
    exclude: &ProfileId,
) -> Result<u32, PersistenceError> {
    let count: i64 = profiles::table
        .filter(profiles::signup_device.eq(device))
        .filter(profiles::profile_id.ne(exclude.as_str()))
        .count()
        .get_result(conn)?;
    Ok(to_count(count))
}

/// Profiles with at least one qualified referral.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn profiles_with_qualified_referrals(
    conn: &mut SqliteConnection,
) -> Result<Vec<ProfileId>, PersistenceError> {
    let ids: Vec<String> = profiles::table
        .filter(profiles::qualified_referrals.gt(0))
        .order(profiles::profile_id.asc())
        .select(profiles::profile_id)
        .load::<String>(conn)?;
    Ok(ids.into_iter().map(ProfileId::new).collect())
}
