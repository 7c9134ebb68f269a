//! Currency types for exposure aggregation.
//!
//! This module provides ISO 4217 currency codes with decimal precision
//! metadata.
//!
//! # Examples
//!
//! ```
//! use risk_core::types::currency::Currency;
//!
//! let usd = Currency::USD;
//! assert_eq!(usd.code(), "USD");
//! assert_eq!(usd.decimal_places(), 2);
//!
//! let jpy = Currency::JPY;
//! assert_eq!(jpy.decimal_places(), 0);  // Yen has no minor units
//! ```

use std::fmt;
use std::str::FromStr;

use super::error::CurrencyError;

/// ISO 4217 currency codes with decimal precision metadata.
///
/// The set covers the major CSA collateral currencies. Enum-based for
/// static dispatch; parsing is case-insensitive.
///
/// # Examples
///
/// ```
/// use risk_core::types::currency::Currency;
///
/// let eur: Currency = "eur".parse().unwrap();
/// assert_eq!(eur, Currency::EUR);
/// ```
#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Currency {
    /// United States Dollar (2 decimal places)
    USD,
    /// Euro (2 decimal places)
    EUR,
    /// British Pound Sterling (2 decimal places)
    GBP,
    /// Japanese Yen (0 decimal places)
    JPY,
    /// Swiss Franc (2 decimal places)
    CHF,
}

impl Currency {
    /// Returns the ISO 4217 three-letter currency code.
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::CHF => "CHF",
        }
    }

    /// Returns the standard number of decimal places for the currency.
    #[inline]
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    /// Parses a currency from its ISO 4217 code (case-insensitive).
    fn from_str(s: &str) -> Result<Self, CurrencyError> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "JPY" => Ok(Currency::JPY),
            "CHF" => Ok(Currency::CHF),
            _ => Err(CurrencyError::UnknownCurrency(s.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(Currency::USD.code(), "USD");
        assert_eq!(Currency::CHF.code(), "CHF");
    }

    #[test]
    fn test_decimal_places() {
        assert_eq!(Currency::EUR.decimal_places(), 2);
        assert_eq!(Currency::JPY.decimal_places(), 0);
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("gbp".parse::<Currency>().unwrap(), Currency::GBP);
        assert_eq!("GBP".parse::<Currency>().unwrap(), Currency::GBP);
    }

    #[test]
    fn test_parse_unknown() {
        assert!("XYZ".parse::<Currency>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Currency::JPY.to_string(), "JPY");
    }
}
