// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! State-changing statements.
//!
//! Inserts map unique-constraint failures to `PersistenceError::Duplicate`
//! naming the entity; updates of a missing row report `NotFound`.
//!
//! ## Module Organization
//!
//! - `profiles`: Profiles and their referral codes
//! - `commissions`: Commission documents
//! - `referrals`: Referral edges
//! - `withdrawals`: Withdrawal documents
//! - `records`: Config, fraud alerts and audit events

pub mod commissions;
pub mod profiles;
pub mod records;
pub mod referrals;
pub mod withdrawals;

use crate::error::PersistenceError;

/// Turns an update that touched no row into `NotFound`.
fn require_updated(
    affected: usize,
    entity: &'static str,
    id: &str,
) -> Result<(), PersistenceError> {
    if affected == 0 {
        return Err(PersistenceError::NotFound {
            entity,
            id: id.to_string(),
        });
    }
    Ok(())
}
