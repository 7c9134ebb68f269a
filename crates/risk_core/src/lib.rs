//! # risk_core: Foundation Types for Counterparty Risk Analytics
//!
//! ## Layer 1 (Foundation) Role
//!
//! risk_core is the bottom layer of the 4-layer architecture, providing:
//! - Time types: `Date`, `DayCountConvention` (`types::time`)
//! - Currency types: `Currency` (`types::currency`)
//! - Typed identifiers: `TradeId`, `NettingSetId`, `CounterpartyId` (`types::ids`)
//! - Error types: `DateError`, `CurrencyError`, `CubeError` (`types::error`)
//! - The dense exposure store: `ExposureCube`, `ExposureMetric` (`cube`)
//!
//! ## Zero Dependency Principle
//!
//! Layer 1 has no dependencies on other risk_* crates, with minimal external
//! dependencies:
//! - chrono: Date arithmetic
//! - thiserror: Structured error types
//! - serde: Serialisation support (optional, default on)
//!
//! Parallelisation (rayon) and logging (tracing) enter the stack in the
//! simulation and aggregation layers; the foundation stays free of them.
//!
//! ## Usage Examples
//!
//! ```rust
//! use risk_core::types::{Date, DayCountConvention, Currency};
//!
//! // Date operations
//! let start = Date::from_ymd(2024, 1, 1).unwrap();
//! let end = Date::from_ymd(2024, 7, 1).unwrap();
//! let year_fraction = DayCountConvention::Act365Fixed.year_fraction(start, end);
//! assert!(year_fraction > 0.0);
//!
//! // Currency information
//! let usd = Currency::USD;
//! assert_eq!(usd.code(), "USD");
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod cube;
pub mod types;

pub use cube::{ExposureCube, ExposureMetric, EXPOSURE_DEPTH, SURVIVAL_SLOT};
pub use types::{
    CounterpartyId, CubeError, Currency, CurrencyError, Date, DateError, DayCountConvention,
    NettingSetId, TradeId,
};
