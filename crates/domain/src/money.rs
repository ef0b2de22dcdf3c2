// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Integer money arithmetic.
//!
//! All amounts are minor currency units (cents). Percentages are held in
//! basis points so that no floating point value ever touches a balance.

use crate::error::DomainError;
use serde::{Deserialize, Serialize};

/// An amount in minor currency units.
pub type Cents = i64;

const BASIS_POINTS_PER_UNIT: i128 = 10_000;

/// A percentage rate expressed in basis points (1/100 of a percent).
///
/// `Rate::from_basis_points(1_000)` is 10%.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Rate(u32);

impl Rate {
    /// A zero rate.
    pub const ZERO: Self = Self(0);

    /// Creates a rate from basis points.
    #[must_use]
    pub const fn from_basis_points(basis_points: u32) -> Self {
        Self(basis_points)
    }

    /// Creates a rate from a whole percentage.
    #[must_use]
    pub const fn from_percent(percent: u32) -> Self {
        Self(percent * 100)
    }

    /// Returns the rate in basis points.
    #[must_use]
    pub const fn basis_points(self) -> u32 {
        self.0
    }

    /// Returns true if the rate is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Applies this rate to a base amount, rounding half away from zero.
    ///
    /// # Arguments
    ///
    /// * `base` - The base amount in minor units
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ArithmeticOverflow` if the result does not fit in `Cents`.
    pub fn apply(self, base: Cents) -> Result<Cents, DomainError> {
        let product: i128 = i128::from(base.unsigned_abs()) * i128::from(self.0);
        let rounded: i128 = (product + BASIS_POINTS_PER_UNIT / 2) / BASIS_POINTS_PER_UNIT;
        let signed: i128 = if base < 0 { -rounded } else { rounded };
        Cents::try_from(signed).map_err(|_| DomainError::ArithmeticOverflow {
            operation: format!("applying rate {self} to {base}"),
        })
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// Formats an amount for human-readable breakdowns, e.g. `10.50 EUR`.
#[must_use]
pub fn format_amount(amount: Cents, currency: &str) -> String {
    let sign: &str = if amount < 0 { "-" } else { "" };
    let abs: u64 = amount.unsigned_abs();
    format!("{sign}{}.{:02} {currency}", abs / 100, abs % 100)
}

/// Validates an ISO 4217 style currency code.
///
/// # Errors
///
/// Returns `DomainError::InvalidCurrency` unless the code is three ASCII uppercase letters.
pub fn validate_currency(code: &str) -> Result<(), DomainError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(DomainError::InvalidCurrency(code.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_percent_of_1050_is_exact() {
        assert_eq!(Rate::from_basis_points(1_000).apply(1_050), Ok(105));
    }

    #[test]
    fn test_ten_percent_of_1051_rounds_down_below_half() {
        assert_eq!(Rate::from_basis_points(1_000).apply(1_051), Ok(105));
    }

    #[test]
    fn test_half_rounds_up() {
        assert_eq!(Rate::from_basis_points(1_000).apply(1_055), Ok(106));
        assert_eq!(Rate::from_basis_points(5_000).apply(1), Ok(1));
    }

    #[test]
    fn test_negative_base_rounds_away_from_zero() {
        assert_eq!(Rate::from_basis_points(1_000).apply(-1_055), Ok(-106));
    }

    #[test]
    fn test_overflow_is_reported() {
        let result = Rate::from_basis_points(20_000).apply(i64::MAX);
        assert!(matches!(
            result,
            Err(DomainError::ArithmeticOverflow { .. })
        ));
    }

    #[test]
    fn test_rate_display() {
        assert_eq!(Rate::from_basis_points(1_250).to_string(), "12.50%");
        assert_eq!(Rate::from_percent(10).to_string(), "10.00%");
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1_050, "EUR"), "10.50 EUR");
        assert_eq!(format_amount(-5, "USD"), "-0.05 USD");
    }

    #[test]
    fn test_currency_validation() {
        assert!(validate_currency("EUR").is_ok());
        assert!(validate_currency("eur").is_err());
        assert!(validate_currency("EURO").is_err());
    }
}
