// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Read-only queries.
//!
//! Every query selects the `document` column and decodes it; the key
//! columns next to it exist only to filter and order.
//!
//! ## Module Organization
//!
//! - `profiles`: Profiles, referral codes and signup signal counts
//! - `commissions`: Commission lookups, due scans and counts
//! - `referrals`: Referral edges
//! - `withdrawals`: Withdrawal lookups
//! - `records`: Config, fraud alerts and audit events

pub mod commissions;
pub mod profiles;
pub mod records;
pub mod referrals;
pub mod withdrawals;

use crate::data_models::from_document;
use crate::error::PersistenceError;

/// Decodes a list of document columns.
fn decode_all<T: serde::de::DeserializeOwned>(
    documents: &[String],
) -> Result<Vec<T>, PersistenceError> {
    documents.iter().map(|d| from_document(d)).collect()
}

/// Saturating conversion of a SQL `COUNT` to the store's counter type.
fn to_count(count: i64) -> u32 {
    u32::try_from(count.max(0)).unwrap_or(u32::MAX)
}
