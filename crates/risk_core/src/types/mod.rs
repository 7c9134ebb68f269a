//! Foundation value types: dates, currencies, identifiers, and errors.

pub mod currency;
pub mod error;
pub mod ids;
pub mod time;

pub use currency::Currency;
pub use error::{CubeError, CurrencyError, DateError};
pub use ids::{CounterpartyId, NettingSetId, TradeId};
pub use time::{Date, DayCountConvention};
