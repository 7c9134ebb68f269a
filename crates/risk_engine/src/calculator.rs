//! Valuation calculators: the pluggable units invoked per trade, date, and
//! sample.
//!
//! The engine has no knowledge of calculator semantics — each calculator
//! decides which cube slots it writes. The set of calculators is closed at
//! configuration time; the engine checks, before the loop starts, that the
//! output cube is deep enough for every registered calculator.

use risk_core::cube::{ExposureCube, ExposureMetric, SURVIVAL_SLOT};
use risk_core::types::{CounterpartyId, Date};

use crate::error::EngineError;
use crate::fixings::FixingBuffer;
use crate::market::ScenarioMarket;
use crate::trade::Priceable;

/// A unit of valuation work invoked for every (trade, date, sample).
///
/// Implementations must be stateless across invocations (or internally
/// synchronised): the same calculator instance is shared by all parallel
/// sample workers.
pub trait ValuationCalculator: Send + Sync {
    /// Returns the minimum cube depth (number of metric slots) this
    /// calculator writes to.
    ///
    /// Checked once against the output cube before the simulation loop; a
    /// shortfall is a configuration error.
    fn required_depth(&self) -> usize;

    /// Computes and stores T0 results for one trade.
    ///
    /// The market is at its asof state.
    ///
    /// # Errors
    ///
    /// Pricing failures propagate; the engine applies its failure policy.
    fn calculate_t0(
        &self,
        trade: &mut dyn Priceable,
        trade_idx: usize,
        market: &dyn ScenarioMarket,
        fixings: &FixingBuffer,
        cube: &mut ExposureCube,
    ) -> Result<(), EngineError>;

    /// Computes and stores results for one trade at one (date, sample).
    ///
    /// # Errors
    ///
    /// Pricing failures propagate; the engine applies its failure policy.
    #[allow(clippy::too_many_arguments)]
    fn calculate(
        &self,
        trade: &mut dyn Priceable,
        trade_idx: usize,
        market: &dyn ScenarioMarket,
        fixings: &FixingBuffer,
        cube: &mut ExposureCube,
        date: Date,
        date_idx: usize,
        sample: usize,
    ) -> Result<(), EngineError>;
}

/// Writes the positive and negative parts of each trade NPV into the
/// EPE and ENE slots of the exposure cube.
///
/// The single NPV evaluation feeds both slots, so each trade is priced
/// exactly once per (date, sample).
#[derive(Clone, Copy, Debug, Default)]
pub struct NpvExposureCalculator;

impl NpvExposureCalculator {
    /// Creates the calculator.
    pub fn new() -> Self {
        Self
    }

    fn store(value: f64, trade_idx: usize, target: Target, cube: &mut ExposureCube) {
        let epe = value.max(0.0);
        let ene = (-value).max(0.0);
        match target {
            Target::T0 => {
                cube.set_t0(epe, trade_idx, ExposureMetric::Epe.slot());
                cube.set_t0(ene, trade_idx, ExposureMetric::Ene.slot());
            }
            Target::Cell { date_idx, sample } => {
                cube.set(epe, trade_idx, date_idx, sample, ExposureMetric::Epe.slot());
                cube.set(ene, trade_idx, date_idx, sample, ExposureMetric::Ene.slot());
            }
        }
    }
}

enum Target {
    T0,
    Cell { date_idx: usize, sample: usize },
}

impl ValuationCalculator for NpvExposureCalculator {
    fn required_depth(&self) -> usize {
        ExposureMetric::Ene.slot() + 1
    }

    fn calculate_t0(
        &self,
        trade: &mut dyn Priceable,
        trade_idx: usize,
        market: &dyn ScenarioMarket,
        fixings: &FixingBuffer,
        cube: &mut ExposureCube,
    ) -> Result<(), EngineError> {
        let value = trade.npv(market, fixings)?;
        Self::store(value, trade_idx, Target::T0, cube);
        Ok(())
    }

    fn calculate(
        &self,
        trade: &mut dyn Priceable,
        trade_idx: usize,
        market: &dyn ScenarioMarket,
        fixings: &FixingBuffer,
        cube: &mut ExposureCube,
        _date: Date,
        date_idx: usize,
        sample: usize,
    ) -> Result<(), EngineError> {
        let value = trade.npv(market, fixings)?;
        Self::store(value, trade_idx, Target::Cell { date_idx, sample }, cube);
        Ok(())
    }
}

/// A unit of valuation work invoked per (counterparty, date, sample).
///
/// Counterparty calculators fill name-keyed cubes (survival probabilities)
/// alongside the trade loop, on the same grid and samples.
pub trait CounterpartyCalculator: Send + Sync {
    /// Stores the T0 value for one counterparty.
    fn calculate_t0(
        &self,
        name: &CounterpartyId,
        name_idx: usize,
        market: &dyn ScenarioMarket,
        cube: &mut ExposureCube,
    ) -> Result<(), EngineError>;

    /// Stores the value for one counterparty at one (date, sample).
    #[allow(clippy::too_many_arguments)]
    fn calculate(
        &self,
        name: &CounterpartyId,
        name_idx: usize,
        market: &dyn ScenarioMarket,
        cube: &mut ExposureCube,
        date: Date,
        date_idx: usize,
        sample: usize,
    ) -> Result<(), EngineError>;
}

/// Fills a survival-probability cube from the market's simulated credit
/// state: one slot per (counterparty, date, sample), T0 probability 1.
#[derive(Clone, Copy, Debug, Default)]
pub struct SurvivalProbabilityCalculator;

impl SurvivalProbabilityCalculator {
    /// Creates the calculator.
    pub fn new() -> Self {
        Self
    }
}

impl CounterpartyCalculator for SurvivalProbabilityCalculator {
    fn calculate_t0(
        &self,
        _name: &CounterpartyId,
        name_idx: usize,
        _market: &dyn ScenarioMarket,
        cube: &mut ExposureCube,
    ) -> Result<(), EngineError> {
        // No default can have occurred by the asof date.
        cube.set_t0(1.0, name_idx, SURVIVAL_SLOT);
        Ok(())
    }

    fn calculate(
        &self,
        name: &CounterpartyId,
        name_idx: usize,
        market: &dyn ScenarioMarket,
        cube: &mut ExposureCube,
        _date: Date,
        date_idx: usize,
        sample: usize,
    ) -> Result<(), EngineError> {
        let sp = market.survival_probability(name.as_str())?;
        cube.set(sp, name_idx, date_idx, sample, SURVIVAL_SLOT);
        Ok(())
    }
}
