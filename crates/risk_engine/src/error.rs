//! Engine error types.
//!
//! Configuration errors (dimension mismatches, bad grids) are fatal and
//! detected before the simulation loop starts. Pricing failures inside the
//! loop carry their full (trade, date, sample) context and are handled
//! according to the configured [`PricingFailurePolicy`](crate::engine::PricingFailurePolicy).

use thiserror::Error;

use risk_core::types::{CubeError, Date};

/// Errors raised by the valuation engine and its boundary traits.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The portfolio contains no trades.
    #[error("portfolio is empty")]
    EmptyPortfolio,

    /// The cube entity axis does not match the portfolio.
    #[error("cube entity axis ({cube}) differs from portfolio size ({portfolio})")]
    EntityAxisMismatch {
        /// Entity count of the output cube
        cube: usize,
        /// Number of trades in the portfolio
        portfolio: usize,
    },

    /// The cube date axis does not match the simulation grid.
    #[error("cube date axis ({cube}) differs from date grid size ({grid})")]
    DateAxisMismatch {
        /// Date count of the output cube
        cube: usize,
        /// Date count of the simulation grid
        grid: usize,
    },

    /// The counterparty cube axis does not match the counterparty list.
    #[error("counterparty cube axis ({cube}) differs from counterparty count ({counterparties})")]
    CounterpartyAxisMismatch {
        /// Entity count of the counterparty cube
        cube: usize,
        /// Number of counterparty names supplied
        counterparties: usize,
    },

    /// A calculator requires more metric slots than the cube provides.
    #[error("calculators require cube depth {required} but cube has {actual}")]
    DepthTooSmall {
        /// Largest depth required by any registered calculator
        required: usize,
        /// Actual cube depth
        actual: usize,
    },

    /// The reference date is not strictly before the first simulation date.
    #[error("asof date {asof} must be strictly before first simulation date {first}")]
    AsofNotBeforeGrid {
        /// Engine reference date
        asof: Date,
        /// First date of the simulation grid
        first: Date,
    },

    /// The simulation date grid is empty or not strictly increasing.
    #[error("invalid date grid: {0}")]
    InvalidDateGrid(String),

    /// A market boundary operation failed.
    #[error("market error: {0}")]
    Market(String),

    /// A single trade valuation failed during the simulation loop.
    ///
    /// Carries the full scenario context so the failure can be located in
    /// the cube.
    #[error("pricing failed for trade '{trade}' at {date}, sample {sample}: {reason}")]
    Pricing {
        /// Trade id
        trade: String,
        /// Simulation date of the failing valuation
        date: Date,
        /// Sample index of the failing valuation
        sample: usize,
        /// Underlying failure description
        reason: String,
    },

    /// A trade valuation failed during the T0 pass.
    #[error("T0 valuation failed for trade '{trade}': {reason}")]
    PricingT0 {
        /// Trade id
        trade: String,
        /// Underlying failure description
        reason: String,
    },

    /// A cube operation failed.
    #[error(transparent)]
    Cube(#[from] CubeError),
}
