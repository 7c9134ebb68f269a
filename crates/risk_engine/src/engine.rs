//! The valuation engine: samples × dates × trades.
//!
//! For a fixed date grid and sample count, the engine guarantees that every
//! trade is priced exactly once per (date, sample) pair by each registered
//! calculator, with time-consistent market and index-fixing state. Within a
//! sample the date loop is strictly sequential; across samples the work is
//! embarrassingly parallel, and [`ValuationEngine::build_cube_parallel`]
//! exploits that with per-worker market and trade state.

use rayon::prelude::*;
use tracing::{debug, error, info};

use risk_core::cube::ExposureCube;
use risk_core::types::{CounterpartyId, Date};

use crate::calculator::{CounterpartyCalculator, ValuationCalculator};
use crate::error::EngineError;
use crate::fixings::FixingBuffer;
use crate::grid::DateGrid;
use crate::market::ScenarioMarket;
use crate::trade::Priceable;

/// Policy applied when a single trade valuation fails inside the loop.
///
/// The choice is an explicit configuration decision: the engine never
/// converts a failure into a plausible-looking value on its own.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PricingFailurePolicy {
    /// Abort the whole run on the first failure (conservative default).
    Abort,
    /// Log the failure, keep simulating, and afterwards overwrite every
    /// cell of each failed trade (T0 included) with the given sentinel so
    /// partial results are unmistakably marked.
    Sentinel(f64),
}

impl Default for PricingFailurePolicy {
    fn default() -> Self {
        PricingFailurePolicy::Abort
    }
}

/// Counterparty outputs filled alongside the trade loop: a name-keyed cube
/// (survival probabilities) and the calculators that write it.
pub struct CounterpartySection<'a> {
    /// Counterparty names in cube axis order.
    pub counterparties: &'a [CounterpartyId],
    /// Calculators invoked per (counterparty, date, sample).
    pub calculators: &'a [Box<dyn CounterpartyCalculator>],
    /// The name-keyed output cube.
    pub cube: &'a mut ExposureCube,
}

/// Drives the scenario × date × trade valuation loop.
///
/// # Examples
///
/// ```no_run
/// use risk_core::types::Date;
/// use risk_engine::{DateGrid, PricingFailurePolicy, ValuationEngine};
///
/// let asof = Date::from_ymd(2024, 6, 14).unwrap();
/// let grid = DateGrid::new(vec![
///     Date::from_ymd(2024, 7, 1).unwrap(),
///     Date::from_ymd(2025, 1, 1).unwrap(),
/// ]).unwrap();
///
/// let engine = ValuationEngine::new(asof, grid)
///     .unwrap()
///     .with_failure_policy(PricingFailurePolicy::Sentinel(f64::NAN));
/// ```
pub struct ValuationEngine {
    asof: Date,
    grid: DateGrid,
    failure_policy: PricingFailurePolicy,
    historical_fixings: FixingBuffer,
}

impl ValuationEngine {
    /// Creates an engine for the given reference date and simulation grid.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::AsofNotBeforeGrid` unless `asof` is strictly
    /// before the first grid date.
    pub fn new(asof: Date, grid: DateGrid) -> Result<Self, EngineError> {
        if asof >= grid.first() {
            return Err(EngineError::AsofNotBeforeGrid {
                asof,
                first: grid.first(),
            });
        }
        Ok(Self {
            asof,
            grid,
            failure_policy: PricingFailurePolicy::default(),
            historical_fixings: FixingBuffer::new(),
        })
    }

    /// Sets the pricing failure policy.
    pub fn with_failure_policy(mut self, policy: PricingFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Seeds every sample's fixing buffer with a historical snapshot.
    pub fn with_historical_fixings(mut self, fixings: FixingBuffer) -> Self {
        self.historical_fixings = fixings;
        self
    }

    /// Returns the engine reference date.
    #[inline]
    pub fn asof(&self) -> Date {
        self.asof
    }

    /// Returns the simulation date grid.
    #[inline]
    pub fn grid(&self) -> &DateGrid {
        &self.grid
    }

    fn validate(
        &self,
        trades: &[Box<dyn Priceable>],
        calculators: &[Box<dyn ValuationCalculator>],
        cube: &ExposureCube,
    ) -> Result<(), EngineError> {
        if trades.is_empty() {
            return Err(EngineError::EmptyPortfolio);
        }
        if cube.num_ids() != trades.len() {
            return Err(EngineError::EntityAxisMismatch {
                cube: cube.num_ids(),
                portfolio: trades.len(),
            });
        }
        if cube.num_dates() != self.grid.len() {
            return Err(EngineError::DateAxisMismatch {
                cube: cube.num_dates(),
                grid: self.grid.len(),
            });
        }
        let required = calculators
            .iter()
            .map(|c| c.required_depth())
            .max()
            .unwrap_or(0);
        if cube.depth() < required {
            return Err(EngineError::DepthTooSmall {
                required,
                actual: cube.depth(),
            });
        }
        Ok(())
    }

    /// Fills the exposure cube by walking every sample of the grid
    /// sequentially.
    ///
    /// The optional counterparty section is filled on the same loop:
    /// its calculators run once per (counterparty, date, sample) after the
    /// trade loop of each date.
    ///
    /// # Errors
    ///
    /// Configuration errors (axis mismatches, insufficient depth) are
    /// detected before any valuation. Pricing failures follow the
    /// configured [`PricingFailurePolicy`]; market errors are always fatal.
    pub fn build_cube(
        &self,
        trades: &mut [Box<dyn Priceable>],
        market: &mut dyn ScenarioMarket,
        calculators: &[Box<dyn ValuationCalculator>],
        cube: &mut ExposureCube,
        mut counterparty: Option<&mut CounterpartySection<'_>>,
    ) -> Result<(), EngineError> {
        self.validate(trades, calculators, cube)?;
        if let Some(section) = counterparty.as_deref_mut() {
            if section.cube.num_ids() != section.counterparties.len() {
                return Err(EngineError::CounterpartyAxisMismatch {
                    cube: section.cube.num_ids(),
                    counterparties: section.counterparties.len(),
                });
            }
            if section.cube.num_dates() != self.grid.len() {
                return Err(EngineError::DateAxisMismatch {
                    cube: section.cube.num_dates(),
                    grid: self.grid.len(),
                });
            }
        }

        info!(
            trades = trades.len(),
            samples = cube.samples(),
            dates = self.grid.len(),
            "starting valuation loop"
        );

        let mut trade_has_error = vec![false; trades.len()];

        self.run_t0(trades, market, calculators, cube, &mut trade_has_error)?;
        if let Some(section) = counterparty.as_deref_mut() {
            for (k, name) in section.counterparties.iter().enumerate() {
                for calc in section.calculators {
                    calc.calculate_t0(name, k, market, section.cube)?;
                }
            }
        }

        for sample in 0..cube.samples() {
            self.run_sample(
                sample,
                sample,
                trades,
                market,
                calculators,
                cube,
                counterparty.as_deref_mut(),
                &mut trade_has_error,
            )?;
        }

        self.apply_sentinel(trades, cube, &trade_has_error);
        info!("valuation loop completed");
        Ok(())
    }

    /// Fills the exposure cube with sample-level parallelism.
    ///
    /// The sample range is split into contiguous chunks, one per Rayon
    /// worker. `factory` builds a private (trades, market) pair per worker,
    /// so no scenario state is shared; each worker fills a private chunk
    /// cube which is merged into `cube` afterwards. For a deterministic
    /// market this produces a cube identical to [`ValuationEngine::build_cube`].
    ///
    /// Counterparty cubes carry no pricing cost and are filled via the
    /// sequential builder.
    ///
    /// # Errors
    ///
    /// As for [`ValuationEngine::build_cube`]; the first worker error
    /// aborts the run.
    pub fn build_cube_parallel<F>(
        &self,
        factory: F,
        calculators: &[Box<dyn ValuationCalculator>],
        cube: &mut ExposureCube,
    ) -> Result<(), EngineError>
    where
        F: Fn() -> Result<(Vec<Box<dyn Priceable>>, Box<dyn ScenarioMarket>), EngineError> + Sync,
    {
        let samples = cube.samples();
        let workers = rayon::current_num_threads().max(1).min(samples);
        let chunk_size = samples.div_ceil(workers);
        let ranges: Vec<(usize, usize)> = (0..samples)
            .step_by(chunk_size)
            .map(|start| (start, chunk_size.min(samples - start)))
            .collect();

        info!(
            samples,
            workers = ranges.len(),
            chunk_size,
            "starting parallel valuation loop"
        );

        let ids = cube.ids().to_vec();
        let dates = cube.dates().to_vec();
        let depth = cube.depth();

        let partials: Vec<(usize, ExposureCube, Vec<bool>)> = ranges
            .into_par_iter()
            .map(|(start, len)| -> Result<(usize, ExposureCube, Vec<bool>), EngineError> {
                let (mut trades, mut market) = factory()?;
                let mut block = ExposureCube::new(ids.clone(), dates.clone(), len, depth)?;
                self.validate(&trades, calculators, &block)?;

                let mut trade_has_error = vec![false; trades.len()];
                if start == 0 {
                    self.run_t0(
                        &mut trades,
                        market.as_mut(),
                        calculators,
                        &mut block,
                        &mut trade_has_error,
                    )?;
                }
                for local in 0..len {
                    self.run_sample(
                        start + local,
                        local,
                        &mut trades,
                        market.as_mut(),
                        calculators,
                        &mut block,
                        None,
                        &mut trade_has_error,
                    )?;
                }
                Ok((start, block, trade_has_error))
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        let mut trade_has_error = vec![false; cube.num_ids()];
        for (start, block, errors) in &partials {
            cube.copy_sample_block(block, *start)?;
            if *start == 0 {
                for id_idx in 0..cube.num_ids() {
                    for slot in 0..depth {
                        cube.set_t0(block.get_t0(id_idx, slot), id_idx, slot);
                    }
                }
            }
            for (flag, seen) in trade_has_error.iter_mut().zip(errors) {
                *flag |= seen;
            }
        }

        // Sentinel marking needs trade ids only for logging; take them from
        // the cube axis, which the factory portfolios are aligned with.
        if let PricingFailurePolicy::Sentinel(value) = self.failure_policy {
            for (j, flagged) in trade_has_error.iter().enumerate() {
                if *flagged {
                    error!(
                        trade = %cube.ids()[j],
                        "marking all results with sentinel after valuation errors"
                    );
                    Self::fill_trade(cube, j, value);
                }
            }
        }

        info!("parallel valuation loop completed");
        Ok(())
    }

    fn run_t0(
        &self,
        trades: &mut [Box<dyn Priceable>],
        market: &mut dyn ScenarioMarket,
        calculators: &[Box<dyn ValuationCalculator>],
        cube: &mut ExposureCube,
        trade_has_error: &mut [bool],
    ) -> Result<(), EngineError> {
        let fixings = self.historical_fixings.clone();
        for (j, trade) in trades.iter_mut().enumerate() {
            for calc in calculators {
                if let Err(e) = calc.calculate_t0(trade.as_mut(), j, market, &fixings, cube) {
                    match self.failure_policy {
                        PricingFailurePolicy::Abort => {
                            return Err(EngineError::PricingT0 {
                                trade: trade.id().to_string(),
                                reason: e.to_string(),
                            });
                        }
                        PricingFailurePolicy::Sentinel(_) => {
                            error!(trade = %trade.id(), reason = %e, "T0 valuation error");
                            trade_has_error[j] = true;
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_sample(
        &self,
        global_sample: usize,
        local_sample: usize,
        trades: &mut [Box<dyn Priceable>],
        market: &mut dyn ScenarioMarket,
        calculators: &[Box<dyn ValuationCalculator>],
        cube: &mut ExposureCube,
        mut counterparty: Option<&mut CounterpartySection<'_>>,
        trade_has_error: &mut [bool],
    ) -> Result<(), EngineError> {
        debug!(sample = global_sample, "starting sample");

        // Path-dependent trade state must not carry over between samples.
        for trade in trades.iter_mut() {
            trade.reset();
        }
        market.begin_sample(global_sample)?;

        // The sample owns its fixing view; it is discarded at sample end.
        let mut fixings = self.historical_fixings.clone();
        let mut prev = self.asof;

        for (date_idx, &date) in self.grid.dates().iter().enumerate() {
            market.advance_to(date)?;

            // Synthesise fixings falling in (prev, date] from the current
            // index level, so cash flows between simulation steps are
            // deterministic within the sample.
            for trade in trades.iter() {
                for req in trade.fixing_requirements() {
                    if req.fixing_date > prev
                        && req.fixing_date <= date
                        && !fixings.contains(&req.index, req.fixing_date)
                    {
                        let level = market.index_level(&req.index)?;
                        fixings.insert(req.index.clone(), req.fixing_date, level);
                    }
                }
            }

            for (j, trade) in trades.iter_mut().enumerate() {
                if trade_has_error[j] {
                    continue;
                }
                for calc in calculators {
                    if let Err(e) = calc.calculate(
                        trade.as_mut(),
                        j,
                        market,
                        &fixings,
                        cube,
                        date,
                        date_idx,
                        local_sample,
                    ) {
                        match self.failure_policy {
                            PricingFailurePolicy::Abort => {
                                return Err(EngineError::Pricing {
                                    trade: trade.id().to_string(),
                                    date,
                                    sample: global_sample,
                                    reason: e.to_string(),
                                });
                            }
                            PricingFailurePolicy::Sentinel(_) => {
                                error!(
                                    trade = %trade.id(),
                                    %date,
                                    sample = global_sample,
                                    reason = %e,
                                    "valuation error"
                                );
                                trade_has_error[j] = true;
                                break;
                            }
                        }
                    }
                }
            }

            if let Some(section) = counterparty.as_deref_mut() {
                for (k, name) in section.counterparties.iter().enumerate() {
                    for calc in section.calculators {
                        calc.calculate(name, k, market, section.cube, date, date_idx, local_sample)?;
                    }
                }
            }

            prev = date;
        }
        Ok(())
    }

    fn apply_sentinel(
        &self,
        trades: &[Box<dyn Priceable>],
        cube: &mut ExposureCube,
        trade_has_error: &[bool],
    ) {
        if let PricingFailurePolicy::Sentinel(value) = self.failure_policy {
            for (j, flagged) in trade_has_error.iter().enumerate() {
                if *flagged {
                    error!(
                        trade = %trades[j].id(),
                        "marking all results with sentinel after valuation errors"
                    );
                    Self::fill_trade(cube, j, value);
                }
            }
        }
    }

    fn fill_trade(cube: &mut ExposureCube, trade_idx: usize, value: f64) {
        for slot in 0..cube.depth() {
            cube.set_t0(value, trade_idx, slot);
            for date_idx in 0..cube.num_dates() {
                for sample in 0..cube.samples() {
                    cube.set(value, trade_idx, date_idx, sample, slot);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use risk_core::cube::{ExposureMetric, EXPOSURE_DEPTH, SURVIVAL_SLOT};
    use risk_core::types::{Currency, TradeId};

    use crate::calculator::{NpvExposureCalculator, SurvivalProbabilityCalculator};
    use crate::trade::FixingRequirement;

    fn d(y: i32, m: u32, day: u32) -> Date {
        Date::from_ymd(y, m, day).unwrap()
    }

    fn asof() -> Date {
        d(2024, 6, 14)
    }

    fn grid() -> DateGrid {
        DateGrid::new(vec![d(2024, 7, 1), d(2025, 1, 1), d(2025, 7, 1)]).unwrap()
    }

    /// Deterministic market: index levels and survival probabilities are
    /// pure functions of (sample, date).
    struct GridMarket {
        asof: Date,
        sample: usize,
        current: Date,
    }

    impl GridMarket {
        fn new() -> Self {
            Self {
                asof: asof(),
                sample: 0,
                current: asof(),
            }
        }

        fn level(sample: usize, days: i64) -> f64 {
            100.0 + 10.0 * sample as f64 + 0.5 * days as f64
        }
    }

    impl ScenarioMarket for GridMarket {
        fn asof(&self) -> Date {
            self.asof
        }

        fn begin_sample(&mut self, sample: usize) -> Result<(), EngineError> {
            self.sample = sample;
            self.current = self.asof;
            Ok(())
        }

        fn advance_to(&mut self, date: Date) -> Result<(), EngineError> {
            self.current = date;
            Ok(())
        }

        fn index_level(&self, index: &str) -> Result<f64, EngineError> {
            match index {
                "IDX" => Ok(Self::level(self.sample, self.current - self.asof)),
                _ => Err(EngineError::Market(format!("unknown index '{}'", index))),
            }
        }

        fn survival_probability(&self, _entity: &str) -> Result<f64, EngineError> {
            let years = (self.current - self.asof) as f64 / 365.0;
            Ok((-0.02 * years * (self.sample as f64 + 1.0)).exp())
        }
    }

    /// Prices to the current IDX level scaled by a notional factor.
    struct IndexTrade {
        id: TradeId,
        scale: f64,
        requirements: Vec<FixingRequirement>,
    }

    impl IndexTrade {
        fn new(id: &str, scale: f64) -> Self {
            Self {
                id: TradeId::new(id),
                scale,
                requirements: Vec::new(),
            }
        }
    }

    impl Priceable for IndexTrade {
        fn id(&self) -> &TradeId {
            &self.id
        }

        fn currency(&self) -> Currency {
            Currency::USD
        }

        fn maturity(&self) -> Date {
            d(2025, 7, 1)
        }

        fn reset(&mut self) {}

        fn fixing_requirements(&self) -> &[FixingRequirement] {
            &self.requirements
        }

        fn npv(
            &mut self,
            market: &dyn ScenarioMarket,
            _fixings: &FixingBuffer,
        ) -> Result<f64, EngineError> {
            Ok(self.scale * market.index_level("IDX")?)
        }
    }

    /// Prices to the synthesised fixing value, zero while it is missing.
    struct FixingTrade {
        id: TradeId,
        requirements: Vec<FixingRequirement>,
    }

    impl FixingTrade {
        fn new(fixing_date: Date) -> Self {
            Self {
                id: TradeId::new("FIX1"),
                requirements: vec![FixingRequirement {
                    index: "IDX".to_string(),
                    fixing_date,
                }],
            }
        }
    }

    impl Priceable for FixingTrade {
        fn id(&self) -> &TradeId {
            &self.id
        }

        fn currency(&self) -> Currency {
            Currency::USD
        }

        fn maturity(&self) -> Date {
            d(2025, 7, 1)
        }

        fn reset(&mut self) {}

        fn fixing_requirements(&self) -> &[FixingRequirement] {
            &self.requirements
        }

        fn npv(
            &mut self,
            _market: &dyn ScenarioMarket,
            fixings: &FixingBuffer,
        ) -> Result<f64, EngineError> {
            Ok(fixings
                .get("IDX", self.requirements[0].fixing_date)
                .unwrap_or(0.0))
        }
    }

    /// Succeeds at T0, fails on every scenario valuation.
    struct FailingTrade {
        id: TradeId,
        calls: usize,
        requirements: Vec<FixingRequirement>,
    }

    impl FailingTrade {
        fn new(id: &str) -> Self {
            Self {
                id: TradeId::new(id),
                calls: 0,
                requirements: Vec::new(),
            }
        }
    }

    impl Priceable for FailingTrade {
        fn id(&self) -> &TradeId {
            &self.id
        }

        fn currency(&self) -> Currency {
            Currency::USD
        }

        fn maturity(&self) -> Date {
            d(2025, 7, 1)
        }

        fn reset(&mut self) {}

        fn fixing_requirements(&self) -> &[FixingRequirement] {
            &self.requirements
        }

        fn npv(
            &mut self,
            _market: &dyn ScenarioMarket,
            _fixings: &FixingBuffer,
        ) -> Result<f64, EngineError> {
            self.calls += 1;
            if self.calls == 1 {
                Ok(0.0)
            } else {
                Err(EngineError::Market("model blew up".to_string()))
            }
        }
    }

    /// Increments slot 0 of its cell by one and counts invocations.
    struct CountingCalculator {
        invocations: Arc<AtomicUsize>,
    }

    impl ValuationCalculator for CountingCalculator {
        fn required_depth(&self) -> usize {
            1
        }

        fn calculate_t0(
            &self,
            _trade: &mut dyn Priceable,
            trade_idx: usize,
            _market: &dyn ScenarioMarket,
            _fixings: &FixingBuffer,
            cube: &mut ExposureCube,
        ) -> Result<(), EngineError> {
            cube.set_t0(cube.get_t0(trade_idx, 0) + 1.0, trade_idx, 0);
            Ok(())
        }

        fn calculate(
            &self,
            _trade: &mut dyn Priceable,
            trade_idx: usize,
            _market: &dyn ScenarioMarket,
            _fixings: &FixingBuffer,
            cube: &mut ExposureCube,
            _date: Date,
            date_idx: usize,
            sample: usize,
        ) -> Result<(), EngineError> {
            self.invocations.fetch_add(1, Ordering::Relaxed);
            cube.set(
                cube.get(trade_idx, date_idx, sample, 0) + 1.0,
                trade_idx,
                date_idx,
                sample,
                0,
            );
            Ok(())
        }
    }

    fn trades(n: usize) -> Vec<Box<dyn Priceable>> {
        (0..n)
            .map(|i| {
                Box::new(IndexTrade::new(&format!("T{:03}", i + 1), (i + 1) as f64))
                    as Box<dyn Priceable>
            })
            .collect()
    }

    fn cube(ids: usize, samples: usize) -> ExposureCube {
        ExposureCube::new(
            (0..ids).map(|i| format!("T{:03}", i + 1)).collect(),
            grid().dates().to_vec(),
            samples,
            EXPOSURE_DEPTH,
        )
        .unwrap()
    }

    #[test]
    fn test_asof_must_precede_grid() {
        let result = ValuationEngine::new(d(2024, 7, 1), grid());
        assert!(matches!(
            result,
            Err(EngineError::AsofNotBeforeGrid { .. })
        ));
    }

    #[test]
    fn test_dimension_mismatches_rejected() {
        let engine = ValuationEngine::new(asof(), grid()).unwrap();
        let calcs: Vec<Box<dyn ValuationCalculator>> = vec![Box::new(NpvExposureCalculator::new())];
        let mut market = GridMarket::new();

        let mut portfolio = trades(2);
        let mut wrong_ids = cube(3, 4);
        assert!(matches!(
            engine.build_cube(&mut portfolio, &mut market, &calcs, &mut wrong_ids, None),
            Err(EngineError::EntityAxisMismatch { cube: 3, portfolio: 2 })
        ));

        let mut wrong_dates = ExposureCube::new(
            vec!["T001".to_string(), "T002".to_string()],
            vec![d(2024, 7, 1)],
            4,
            EXPOSURE_DEPTH,
        )
        .unwrap();
        assert!(matches!(
            engine.build_cube(&mut portfolio, &mut market, &calcs, &mut wrong_dates, None),
            Err(EngineError::DateAxisMismatch { cube: 1, grid: 3 })
        ));

        let mut empty: Vec<Box<dyn Priceable>> = Vec::new();
        let mut ok_cube = cube(2, 4);
        assert!(matches!(
            engine.build_cube(&mut empty, &mut market, &calcs, &mut ok_cube, None),
            Err(EngineError::EmptyPortfolio)
        ));
    }

    #[test]
    fn test_depth_checked_against_calculators() {
        let engine = ValuationEngine::new(asof(), grid()).unwrap();
        let calcs: Vec<Box<dyn ValuationCalculator>> = vec![Box::new(NpvExposureCalculator::new())];
        let mut market = GridMarket::new();
        let mut portfolio = trades(1);
        let mut shallow = ExposureCube::new(
            vec!["T001".to_string()],
            grid().dates().to_vec(),
            2,
            1,
        )
        .unwrap();
        assert!(matches!(
            engine.build_cube(&mut portfolio, &mut market, &calcs, &mut shallow, None),
            Err(EngineError::DepthTooSmall { required: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_every_cell_written_exactly_once() {
        let engine = ValuationEngine::new(asof(), grid()).unwrap();
        let invocations = Arc::new(AtomicUsize::new(0));
        let calcs: Vec<Box<dyn ValuationCalculator>> = vec![Box::new(CountingCalculator {
            invocations: invocations.clone(),
        })];
        let mut market = GridMarket::new();
        let mut portfolio = trades(3);
        let mut out = cube(3, 5);

        engine
            .build_cube(&mut portfolio, &mut market, &calcs, &mut out, None)
            .unwrap();

        assert_eq!(invocations.load(Ordering::Relaxed), 3 * 3 * 5);
        for j in 0..3 {
            assert_eq!(out.get_t0(j, 0), 1.0);
            for date_idx in 0..3 {
                for sample in 0..5 {
                    assert_eq!(out.get(j, date_idx, sample, 0), 1.0);
                }
            }
        }
    }

    #[test]
    fn test_npv_exposure_calculator_fills_epe_ene() {
        let engine = ValuationEngine::new(asof(), grid()).unwrap();
        let calcs: Vec<Box<dyn ValuationCalculator>> = vec![Box::new(NpvExposureCalculator::new())];
        let mut market = GridMarket::new();
        // Scale -1 makes the NPV negative everywhere: ENE slot carries it.
        let mut portfolio: Vec<Box<dyn Priceable>> =
            vec![Box::new(IndexTrade::new("T001", -1.0))];
        let mut out = cube(1, 2);

        engine
            .build_cube(&mut portfolio, &mut market, &calcs, &mut out, None)
            .unwrap();

        let days = d(2025, 1, 1) - asof();
        let expected = GridMarket::level(1, days);
        assert_relative_eq!(
            out.get(0, 1, 1, ExposureMetric::Ene.slot()),
            expected,
            epsilon = 1e-12
        );
        assert_eq!(out.get(0, 1, 1, ExposureMetric::Epe.slot()), 0.0);
    }

    #[test]
    fn test_fixing_synthesised_between_steps_per_sample() {
        let engine = ValuationEngine::new(asof(), grid()).unwrap();
        let calcs: Vec<Box<dyn ValuationCalculator>> = vec![Box::new(NpvExposureCalculator::new())];
        let mut market = GridMarket::new();
        // Fixing falls strictly between the first and second grid dates.
        let fixing_date = d(2024, 10, 1);
        let mut portfolio: Vec<Box<dyn Priceable>> = vec![Box::new(FixingTrade::new(fixing_date))];
        let mut out = cube(1, 3);

        engine
            .build_cube(&mut portfolio, &mut market, &calcs, &mut out, None)
            .unwrap();

        let epe = ExposureMetric::Epe.slot();
        for sample in 0..3 {
            // Before the fixing interval the fixing is missing: NPV zero.
            assert_eq!(out.get(0, 0, sample, epe), 0.0);
            // The fixing is synthesised from the index level at the step
            // that closes the interval, per sample path.
            let expected = GridMarket::level(sample, d(2025, 1, 1) - asof());
            assert_relative_eq!(out.get(0, 1, sample, epe), expected, epsilon = 1e-12);
            assert_relative_eq!(out.get(0, 2, sample, epe), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_abort_policy_carries_context() {
        let engine = ValuationEngine::new(asof(), grid()).unwrap();
        let calcs: Vec<Box<dyn ValuationCalculator>> = vec![Box::new(NpvExposureCalculator::new())];
        let mut market = GridMarket::new();
        let mut portfolio: Vec<Box<dyn Priceable>> = vec![Box::new(FailingTrade::new("T001"))];
        let mut out = cube(1, 2);

        let err = engine
            .build_cube(&mut portfolio, &mut market, &calcs, &mut out, None)
            .unwrap_err();
        match err {
            EngineError::Pricing {
                trade,
                date,
                sample,
                ..
            } => {
                assert_eq!(trade, "T001");
                assert_eq!(date, d(2024, 7, 1));
                assert_eq!(sample, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sentinel_policy_marks_failed_trade_only() {
        let sentinel = -9999.0;
        let engine = ValuationEngine::new(asof(), grid())
            .unwrap()
            .with_failure_policy(PricingFailurePolicy::Sentinel(sentinel));
        let calcs: Vec<Box<dyn ValuationCalculator>> = vec![Box::new(NpvExposureCalculator::new())];
        let mut market = GridMarket::new();
        let mut portfolio: Vec<Box<dyn Priceable>> = vec![
            Box::new(FailingTrade::new("T001")),
            Box::new(IndexTrade::new("T002", 1.0)),
        ];
        let mut out = cube(2, 2);

        engine
            .build_cube(&mut portfolio, &mut market, &calcs, &mut out, None)
            .unwrap();

        // Every cell of the failed trade carries the sentinel, T0 included.
        for slot in 0..out.depth() {
            assert_eq!(out.get_t0(0, slot), sentinel);
            for date_idx in 0..3 {
                for sample in 0..2 {
                    assert_eq!(out.get(0, date_idx, sample, slot), sentinel);
                }
            }
        }
        // The healthy trade is untouched.
        let days = d(2024, 7, 1) - asof();
        assert_relative_eq!(
            out.get(1, 0, 0, ExposureMetric::Epe.slot()),
            GridMarket::level(0, days),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_counterparty_section_fills_survival_cube() {
        let engine = ValuationEngine::new(asof(), grid()).unwrap();
        let calcs: Vec<Box<dyn ValuationCalculator>> = vec![Box::new(NpvExposureCalculator::new())];
        let mut market = GridMarket::new();
        let mut portfolio = trades(1);
        let mut out = cube(1, 2);

        let names = vec![CounterpartyId::new("CP1"), CounterpartyId::new("BANK")];
        let mut survival = ExposureCube::new(
            names.iter().map(|n| n.as_str().to_string()).collect(),
            grid().dates().to_vec(),
            2,
            1,
        )
        .unwrap();
        let cpty_calcs: Vec<Box<dyn CounterpartyCalculator>> =
            vec![Box::new(SurvivalProbabilityCalculator::new())];
        let mut section = CounterpartySection {
            counterparties: &names,
            calculators: &cpty_calcs,
            cube: &mut survival,
        };

        engine
            .build_cube(
                &mut portfolio,
                &mut market,
                &calcs,
                &mut out,
                Some(&mut section),
            )
            .unwrap();

        assert_eq!(survival.get_t0(0, SURVIVAL_SLOT), 1.0);
        let years = (d(2025, 7, 1) - asof()) as f64 / 365.0;
        assert_relative_eq!(
            survival.get(1, 2, 1, SURVIVAL_SLOT),
            (-0.02 * years * 2.0).exp(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_parallel_build_matches_sequential() {
        let engine = ValuationEngine::new(asof(), grid()).unwrap();
        let calcs: Vec<Box<dyn ValuationCalculator>> = vec![Box::new(NpvExposureCalculator::new())];

        let mut sequential = cube(3, 16);
        let mut portfolio = trades(3);
        let mut market = GridMarket::new();
        engine
            .build_cube(&mut portfolio, &mut market, &calcs, &mut sequential, None)
            .unwrap();

        let mut parallel = cube(3, 16);
        engine
            .build_cube_parallel(
                || Ok((trades(3), Box::new(GridMarket::new()) as Box<dyn ScenarioMarket>)),
                &calcs,
                &mut parallel,
            )
            .unwrap();

        for j in 0..3 {
            for slot in 0..EXPOSURE_DEPTH {
                assert_eq!(sequential.get_t0(j, slot), parallel.get_t0(j, slot));
                for date_idx in 0..3 {
                    for sample in 0..16 {
                        assert_eq!(
                            sequential.get(j, date_idx, sample, slot),
                            parallel.get(j, date_idx, sample, slot)
                        );
                    }
                }
            }
        }
    }
}
