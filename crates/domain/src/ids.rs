// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Opaque identifiers for ledger documents.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Prefix used when generating new identifiers of this kind.
            pub const PREFIX: &'static str = $prefix;

            /// Wraps an existing identifier.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generates a fresh identifier stamped with the creation time.
            #[must_use]
            pub fn generate(now: OffsetDateTime) -> Self {
                Self(generate_id(Self::PREFIX, now))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifies a profile (referrer, referee, or both).
    ProfileId,
    "prf"
);
string_id!(
    /// Identifies a single commission credit.
    CommissionId,
    "com"
);
string_id!(
    /// Identifies a withdrawal request.
    WithdrawalId,
    "wdr"
);

/// Builds an identifier of the form `{prefix}_{unix_seconds}_{random}`.
#[must_use]
pub fn generate_id(prefix: &str, now: OffsetDateTime) -> String {
    format!(
        "{prefix}_{}_{:016x}",
        now.unix_timestamp(),
        rand::random::<u64>()
    )
}
