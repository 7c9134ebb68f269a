//! # risk_xva (L4: Aggregation)
//!
//! Consumes the exposure cubes filled by the valuation engine and the
//! collateral paths generated by the margining layer, and produces
//! netting-set exposure, trade-level allocations, and credit/funding/margin
//! valuation adjustments.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    risk_xva (L4)                     │
//! ├──────────────────────────────────────────────────────┤
//! │  netted/     - trade cube → netting-set cube,        │
//! │                optional collateral adjustment        │
//! │  allocation/ - netting-set exposure back-allocation  │
//! │  calculator/ - CVA, DVA, FBA, FCA, MVA increments    │
//! └──────────────────────────────────────────────────────┘
//!          ↑ reads                       ↑ reads
//! ┌──────────────────────┐   ┌──────────────────────────┐
//! │ risk_engine cubes    │   │ risk_collateral accounts │
//! └──────────────────────┘   └──────────────────────────┘
//! ```
//!
//! ## Increment semantics
//!
//! CVA/DVA increments weight the exposure at the interval end by the
//! marginal default probability over the interval; FBA/FCA/MVA increments
//! weight by the joint survival of both parties at the interval start and
//! accrue over the day-count fraction. All increments average over samples
//! and are pure reads of the supplied cubes.

#![warn(missing_docs)]

pub mod allocation;
pub mod calculator;
pub mod error;
pub mod netted;

pub use allocation::{AllocationMethod, ExposureAllocator};
pub use calculator::{IncrementalXvaCalculator, IncrementalXvaCalculatorBuilder};
pub use error::XvaError;
pub use netted::NettedExposureCalculator;
