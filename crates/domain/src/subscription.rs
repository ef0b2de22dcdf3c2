// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Calendar-month arithmetic for subscription renewals.
//!
//! Month `n` of a subscription starts on the start date moved forward by
//! `n - 1` calendar months. When the start day does not exist in the target
//! month the last day of that month is used, so a subscription started on
//! January 31st renews on February 28th (29th in leap years), March 31st,
//! April 30th and so on.

use crate::error::DomainError;
use time::{Date, Month};

/// Number of days in a month.
#[must_use]
pub const fn days_in_month(year: i32, month: Month) -> u8 {
    match month {
        Month::February => {
            if time::util::is_leap_year(year) {
                29
            } else {
                28
            }
        }
        Month::April | Month::June | Month::September | Month::November => 30,
        _ => 31,
    }
}

/// Moves a date forward by whole calendar months, clamping the day.
///
/// # Errors
///
/// Returns `DomainError::DateArithmeticOverflow` if the result is out of range.
pub fn add_months(date: Date, months: u32) -> Result<Date, DomainError> {
    let overflow = || DomainError::DateArithmeticOverflow {
        operation: format!("adding {months} months to {date}"),
    };
    let zero_based: i64 = i64::from(u8::from(date.month())) - 1 + i64::from(months);
    let year: i32 = i32::try_from(i64::from(date.year()) + zero_based / 12).map_err(|_| overflow())?;
    let month_number: u8 = u8::try_from(zero_based % 12 + 1).map_err(|_| overflow())?;
    let month: Month = Month::try_from(month_number).map_err(|_| overflow())?;
    let day: u8 = date.day().min(days_in_month(year, month));
    Date::from_calendar_date(year, month, day).map_err(|_| overflow())
}

/// Returns the 1-based subscription month that contains `period_start`.
///
/// Returns `None` if the period starts before the subscription does.
///
/// # Errors
///
/// Returns `DomainError::DateArithmeticOverflow` on date overflow.
pub fn subscription_month_index(started_on: Date, period_start: Date) -> Result<Option<u32>, DomainError> {
    if period_start < started_on {
        return Ok(None);
    }
    let months_between: i64 = (i64::from(period_start.year()) - i64::from(started_on.year())) * 12
        + i64::from(u8::from(period_start.month()))
        - i64::from(u8::from(started_on.month()));
    let mut elapsed: u32 = u32::try_from(months_between).map_err(|_| {
        DomainError::DateArithmeticOverflow {
            operation: String::from("counting subscription months"),
        }
    })?;
    if add_months(started_on, elapsed)? > period_start {
        elapsed = elapsed.saturating_sub(1);
    }
    Ok(Some(elapsed + 1))
}
