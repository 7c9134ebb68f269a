//! # risk_engine (L2: Simulation)
//!
//! The scenario valuation loop: walks samples × dates × trades, keeps the
//! market and index-fixing state time-consistent, and hands every valuation
//! to a set of pluggable calculators that write into the exposure cube.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            risk_engine (L2)             │
//! ├─────────────────────────────────────────┤
//! │  grid        - simulation date grid     │
//! │  market      - ScenarioMarket boundary  │
//! │  trade       - Priceable boundary       │
//! │  fixings     - per-sample FixingBuffer  │
//! │  calculator  - ValuationCalculator set  │
//! │  engine      - ValuationEngine loop     │
//! └─────────────────────────────────────────┘
//!          ↓ writes
//! ┌─────────────────────────────────────────┐
//! │        risk_core::ExposureCube (L1)     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Loop contract
//!
//! Every trade is priced exactly once per (date, sample) pair by each
//! registered calculator. The date loop within a sample is strictly
//! sequential (market state at a later date is advanced from the earlier
//! one); parallelism is across samples only, each worker owning a private
//! market, private trades, and a private fixing buffer.

#![warn(missing_docs)]

pub mod calculator;
pub mod engine;
pub mod error;
pub mod fixings;
pub mod grid;
pub mod market;
pub mod trade;

pub use calculator::{
    CounterpartyCalculator, NpvExposureCalculator, SurvivalProbabilityCalculator,
    ValuationCalculator,
};
pub use engine::{CounterpartySection, PricingFailurePolicy, ValuationEngine};
pub use error::EngineError;
pub use fixings::FixingBuffer;
pub use grid::DateGrid;
pub use market::ScenarioMarket;
pub use trade::{FixingRequirement, Priceable};
