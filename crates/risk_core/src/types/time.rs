//! Time types and day count conventions for exposure simulation.
//!
//! This module provides:
//! - `Date`: Type-safe date wrapper around chrono::NaiveDate
//! - `DayCountConvention`: Industry-standard day count conventions
//!
//! Margin schedules and simulation grids step in whole calendar days, so
//! `Date` supports day arithmetic in both directions: `date + days` and
//! `date - date`.
//!
//! # Examples
//!
//! ```
//! use risk_core::types::time::{Date, DayCountConvention};
//!
//! let start = Date::from_ymd(2024, 1, 1).unwrap();
//! let end = start + 182;
//!
//! // Calculate year fraction using ACT/365F
//! let yf = DayCountConvention::Act365Fixed.year_fraction(start, end);
//! assert!((yf - 182.0 / 365.0).abs() < 1e-12);
//! ```

use chrono::{Datelike, Duration, NaiveDate};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use super::error::DateError;

/// Type-safe date wrapper around chrono::NaiveDate.
///
/// Provides ISO 8601 parsing/formatting and the day arithmetic needed by
/// the margin-call scheduling loops.
///
/// # Examples
///
/// ```
/// use risk_core::types::time::Date;
///
/// let date = Date::from_ymd(2024, 6, 15).unwrap();
/// assert_eq!(date.year(), 2024);
///
/// // Parse from ISO 8601 string
/// let parsed: Date = "2024-06-15".parse().unwrap();
/// assert_eq!(date, parsed);
///
/// // Day arithmetic
/// let later = date + 10;
/// assert_eq!(later - date, 10);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Date(NaiveDate);

impl Date {
    /// Creates a Date from year, month, and day components.
    ///
    /// # Arguments
    /// * `year` - Year (e.g., 2024)
    /// * `month` - Month (1-12)
    /// * `day` - Day (1-31, depending on month)
    ///
    /// # Errors
    ///
    /// Returns `DateError::InvalidDate` for impossible dates such as
    /// February 30th.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, DateError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Date)
            .ok_or(DateError::InvalidDate { year, month, day })
    }

    /// Parses a date from an ISO 8601 format string (YYYY-MM-DD).
    ///
    /// # Errors
    ///
    /// Returns `DateError::ParseError` if the string is not a valid
    /// ISO 8601 date.
    pub fn parse(s: &str) -> Result<Self, DateError> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Date)
            .map_err(|e| DateError::ParseError(format!("'{}': {}", s, e)))
    }

    /// Returns the underlying chrono::NaiveDate.
    #[inline]
    pub fn into_inner(self) -> NaiveDate {
        self.0
    }

    /// Returns the year component.
    #[inline]
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Returns the month component (1-12).
    #[inline]
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// Returns the day-of-month component (1-31).
    #[inline]
    pub fn day(&self) -> u32 {
        self.0.day()
    }
}

impl Add<i64> for Date {
    type Output = Date;

    /// Returns the date `days` calendar days after `self` (before, for
    /// negative `days`).
    ///
    /// # Examples
    ///
    /// ```
    /// use risk_core::types::time::Date;
    ///
    /// let date = Date::from_ymd(2024, 2, 28).unwrap();
    /// assert_eq!(date + 1, Date::from_ymd(2024, 2, 29).unwrap()); // leap year
    /// assert_eq!(date + 2, Date::from_ymd(2024, 3, 1).unwrap());
    /// ```
    fn add(self, days: i64) -> Date {
        Date(self.0 + Duration::days(days))
    }
}

impl Sub for Date {
    type Output = i64;

    /// Returns the number of days between two dates.
    ///
    /// The result is positive if `self` is after `other`, negative otherwise.
    ///
    /// # Examples
    ///
    /// ```
    /// use risk_core::types::time::Date;
    ///
    /// let start = Date::from_ymd(2024, 1, 1).unwrap();
    /// let end = Date::from_ymd(2024, 1, 11).unwrap();
    ///
    /// assert_eq!(end - start, 10);
    /// assert_eq!(start - end, -10);
    /// ```
    fn sub(self, other: Self) -> i64 {
        (self.0 - other.0).num_days()
    }
}

impl FromStr for Date {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, DateError> {
        Date::parse(s)
    }
}

impl fmt::Display for Date {
    /// Formats the date as ISO 8601 (YYYY-MM-DD).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Day count convention (year fraction convention).
///
/// # Variants
/// - `Act365Fixed`: Actual days / 365 (standard for derivatives collateral accrual)
/// - `Act360`: Actual days / 360 (money market instruments)
/// - `Thirty360`: Each month treated as 30 days, year as 360 days (bond basis)
///
/// # Examples
///
/// ```
/// use risk_core::types::time::{Date, DayCountConvention};
///
/// let start = Date::from_ymd(2024, 1, 1).unwrap();
/// let end = Date::from_ymd(2025, 1, 1).unwrap();
///
/// let yf = DayCountConvention::Act365Fixed.year_fraction(start, end);
/// assert!((yf - 366.0 / 365.0).abs() < 1e-12); // 2024 is a leap year
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DayCountConvention {
    /// Actual days divided by 365.
    Act365Fixed,
    /// Actual days divided by 360.
    Act360,
    /// 30/360 bond basis.
    Thirty360,
}

impl DayCountConvention {
    /// Returns the human-readable convention name.
    pub fn name(&self) -> &'static str {
        match self {
            DayCountConvention::Act365Fixed => "ACT/365F",
            DayCountConvention::Act360 => "ACT/360",
            DayCountConvention::Thirty360 => "30/360",
        }
    }

    /// Computes the year fraction between two dates under this convention.
    ///
    /// Negative if `end` precedes `start`.
    ///
    /// # Arguments
    /// * `start` - Period start date
    /// * `end` - Period end date
    pub fn year_fraction(&self, start: Date, end: Date) -> f64 {
        match self {
            DayCountConvention::Act365Fixed => (end - start) as f64 / 365.0,
            DayCountConvention::Act360 => (end - start) as f64 / 360.0,
            DayCountConvention::Thirty360 => {
                let d1 = (start.day() as i64).min(30);
                let mut d2 = end.day() as i64;
                if d2 == 31 && d1 == 30 {
                    d2 = 30;
                }
                let days = 360 * (end.year() as i64 - start.year() as i64)
                    + 30 * (end.month() as i64 - start.month() as i64)
                    + (d2 - d1);
                days as f64 / 360.0
            }
        }
    }
}

impl FromStr for DayCountConvention {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, DateError> {
        match s {
            "ACT/365F" | "ACT/365" | "Act365Fixed" => Ok(DayCountConvention::Act365Fixed),
            "ACT/360" | "Act360" => Ok(DayCountConvention::Act360),
            "30/360" | "Thirty360" => Ok(DayCountConvention::Thirty360),
            _ => Err(DateError::ParseError(format!(
                "unknown day count convention '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for DayCountConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
