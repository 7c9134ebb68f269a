//! Scenario market boundary.
//!
//! The engine does not construct scenarios or curves; it consumes a market
//! that can be advanced along a scenario path and read deterministically at
//! each (sample, date) state. Scenario generation and model calibration
//! live behind this trait, outside the engine.

use risk_core::types::Date;

use crate::error::EngineError;

/// A simulated market that can be walked through samples and dates.
///
/// # Determinism contract
///
/// After `begin_sample(s)` followed by `advance_to(d)` the readable state
/// (index levels, survival probabilities, anything a trade prices against)
/// must be a pure function of `(s, d)`. The engine relies on this to make
/// sequential and sample-parallel cube builds produce identical results.
///
/// # State machine
///
/// A freshly constructed market reflects the asof date. `begin_sample`
/// rewinds to asof on a new scenario path; `advance_to` then moves forward
/// through the grid dates in strictly increasing order within the sample.
pub trait ScenarioMarket: Send {
    /// Returns the market reference date ("today").
    fn asof(&self) -> Date;

    /// Starts a new scenario path, rewinding the state to the asof date.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Market` if the scenario source cannot produce
    /// the requested sample.
    fn begin_sample(&mut self, sample: usize) -> Result<(), EngineError>;

    /// Advances the market state of the current sample to `date`.
    ///
    /// Called with strictly increasing dates within one sample.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Market` if the state cannot be advanced.
    fn advance_to(&mut self, date: Date) -> Result<(), EngineError>;

    /// Returns the current level of a floating index at the market's
    /// current (sample, date) state.
    ///
    /// Used by the engine to synthesise index fixings that fall between
    /// simulation dates, and by trades for their own coupon projections.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Market` for an unknown index name.
    fn index_level(&self, index: &str) -> Result<f64, EngineError>;

    /// Returns the survival probability of `entity` from asof to the
    /// market's current date, along the current sample path.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Market` for an unknown entity name.
    fn survival_probability(&self, entity: &str) -> Result<f64, EngineError>;
}
