//! Full exposure/xVA pipeline on a simulated GBM index.
//!
//! Builds a two-trade portfolio against one counterparty, fills the trade
//! and survival cubes with the valuation engine, replays CSA margining
//! along every scenario, and prints uncollateralised and collateralised
//! CVA/DVA/FCA.
//!
//! Run with: `cargo run --example exposure_pipeline`

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use risk_collateral::{collateral_balance_paths, CollateralAgreement, CollateralPathInputs};
use risk_core::cube::{ExposureCube, ExposureMetric, EXPOSURE_DEPTH};
use risk_core::types::{
    CounterpartyId, Currency, Date, DayCountConvention, NettingSetId, TradeId,
};
use risk_engine::{
    CounterpartyCalculator, CounterpartySection, DateGrid, EngineError, FixingBuffer,
    FixingRequirement, NpvExposureCalculator, Priceable, ScenarioMarket,
    SurvivalProbabilityCalculator, ValuationCalculator, ValuationEngine,
};
use risk_xva::{IncrementalXvaCalculator, NettedExposureCalculator};

const SAMPLES: usize = 2_000;
const VOL: f64 = 0.2;
const DRIFT: f64 = 0.01;
const SPOT: f64 = 100.0;

/// GBM scenario market with deterministic per-sample seeding.
struct GbmMarket {
    asof: Date,
    sample: usize,
    current: Date,
    level: f64,
    rng: StdRng,
}

impl GbmMarket {
    fn new(asof: Date) -> Self {
        Self {
            asof,
            sample: 0,
            current: asof,
            level: SPOT,
            rng: StdRng::seed_from_u64(42),
        }
    }
}

impl ScenarioMarket for GbmMarket {
    fn asof(&self) -> Date {
        self.asof
    }

    fn begin_sample(&mut self, sample: usize) -> Result<(), EngineError> {
        self.sample = sample;
        self.current = self.asof;
        self.level = SPOT;
        self.rng = StdRng::seed_from_u64(42 ^ (sample as u64).wrapping_mul(0x9E37_79B9));
        Ok(())
    }

    fn advance_to(&mut self, date: Date) -> Result<(), EngineError> {
        let dt = DayCountConvention::Act365Fixed.year_fraction(self.current, date);
        let z: f64 = StandardNormal.sample(&mut self.rng);
        self.level *= ((DRIFT - 0.5 * VOL * VOL) * dt + VOL * dt.sqrt() * z).exp();
        self.current = date;
        Ok(())
    }

    fn index_level(&self, index: &str) -> Result<f64, EngineError> {
        match index {
            "IDX" => Ok(self.level),
            _ => Err(EngineError::Market(format!("unknown index '{}'", index))),
        }
    }

    fn survival_probability(&self, entity: &str) -> Result<f64, EngineError> {
        let hazard = match entity {
            "CP1" => 0.025,
            _ => 0.008,
        };
        let yf = DayCountConvention::Act365Fixed.year_fraction(self.asof, self.current);
        Ok((-hazard * yf).exp())
    }
}

struct ForwardTrade {
    id: TradeId,
    notional: f64,
    strike: f64,
    maturity: Date,
    requirements: Vec<FixingRequirement>,
}

impl Priceable for ForwardTrade {
    fn id(&self) -> &TradeId {
        &self.id
    }

    fn currency(&self) -> Currency {
        Currency::USD
    }

    fn maturity(&self) -> Date {
        self.maturity
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
        Ok(self.notional * (market.index_level("IDX")? - self.strike))
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let asof = Date::from_ymd(2024, 6, 14).unwrap();
    let maturity = Date::from_ymd(2026, 6, 14).unwrap();
    let grid_dates: Vec<Date> = (1..=8).map(|q| asof + q * 91).collect();
    let grid = DateGrid::new(grid_dates.clone()).unwrap();

    // Portfolio: a long and a short forward on the same index, one
    // netting set, one counterparty.
    let trade_ids = ["T1", "T2"];
    let make_portfolio = || -> Vec<Box<dyn Priceable>> {
        vec![
            Box::new(ForwardTrade {
                id: TradeId::new("T1"),
                notional: 1_000.0,
                strike: 95.0,
                maturity,
                requirements: Vec::new(),
            }),
            Box::new(ForwardTrade {
                id: TradeId::new("T2"),
                notional: -400.0,
                strike: 105.0,
                maturity,
                requirements: Vec::new(),
            }),
        ]
    };

    let engine = ValuationEngine::new(asof, grid).unwrap();
    let calculators: Vec<Box<dyn ValuationCalculator>> =
        vec![Box::new(NpvExposureCalculator::new())];

    // Trade cube, filled with sample-level parallelism.
    let mut trade_cube = ExposureCube::new(
        trade_ids.iter().map(|s| s.to_string()).collect(),
        grid_dates.clone(),
        SAMPLES,
        EXPOSURE_DEPTH,
    )
    .unwrap();
    engine
        .build_cube_parallel(
            || Ok((make_portfolio(), Box::new(GbmMarket::new(asof)) as Box<dyn ScenarioMarket>)),
            &calculators,
            &mut trade_cube,
        )
        .unwrap();

    // Survival cube, filled sequentially alongside a second (cheap) pass.
    let names = vec![CounterpartyId::new("CP1"), CounterpartyId::new("BANK")];
    let mut survival_cube = ExposureCube::new(
        names.iter().map(|n| n.as_str().to_string()).collect(),
        grid_dates.clone(),
        SAMPLES,
        1,
    )
    .unwrap();
    {
        let mut shadow_cube = trade_cube.clone();
        let cpty_calculators: Vec<Box<dyn CounterpartyCalculator>> =
            vec![Box::new(SurvivalProbabilityCalculator::new())];
        let mut section = CounterpartySection {
            counterparties: &names,
            calculators: &cpty_calculators,
            cube: &mut survival_cube,
        };
        let mut trades = make_portfolio();
        let mut market = GbmMarket::new(asof);
        engine
            .build_cube(
                &mut trades,
                &mut market,
                &calculators,
                &mut shadow_cube,
                Some(&mut section),
            )
            .unwrap();
    }

    // Netting-set exposure, raw and collateral-adjusted.
    let memberships = vec![NettingSetId::new("NS1"), NettingSetId::new("NS1")];
    let netted = NettedExposureCalculator::new(&trade_cube, &memberships).unwrap();
    let mut netting_cube =
        ExposureCube::new(vec!["NS1".to_string()], grid_dates.clone(), SAMPLES, EXPOSURE_DEPTH)
            .unwrap();
    netted.build(&mut netting_cube, None).unwrap();

    let epe = ExposureMetric::Epe.slot();
    let ene = ExposureMetric::Ene.slot();
    let values: Vec<Vec<f64>> = (0..netting_cube.num_dates())
        .map(|date_idx| {
            (0..SAMPLES)
                .map(|s| {
                    netting_cube.get(0, date_idx, s, epe) - netting_cube.get(0, date_idx, s, ene)
                })
                .collect()
        })
        .collect();
    let flat_ones: Vec<Vec<f64>> = vec![vec![1.0; SAMPLES]; grid_dates.len()];
    let rate_profile: Vec<Vec<f64>> = vec![vec![0.02; SAMPLES]; grid_dates.len()];

    let agreement = Arc::new(
        CollateralAgreement::builder()
            .threshold_rcv(2_000.0)
            .threshold_pay(2_000.0)
            .mta_rcv(500.0)
            .mta_pay(500.0)
            .margin_call_frequency(7)
            .margin_post_frequency(7)
            .margin_period_of_risk(10)
            .build()
            .unwrap(),
    );
    let net_t0 = netting_cube.get_t0(0, epe) - netting_cube.get_t0(0, ene);
    let accounts = collateral_balance_paths(&CollateralPathInputs {
        agreement,
        netting_set_value_t0: net_t0,
        t0: asof,
        netting_set_values: &values,
        netting_set_maturity: maturity,
        date_grid: &grid_dates,
        fx_rate_t0: 1.0,
        fx_rates: &flat_ones,
        collateral_rate_t0: 0.02,
        collateral_rates: &rate_profile,
        initial_balance: 0.0,
    })
    .unwrap();

    let mut collateral = HashMap::new();
    collateral.insert(NettingSetId::new("NS1"), accounts);
    let mut collateralised_cube = ExposureCube::new(
        vec!["NS1".to_string()],
        grid_dates.clone(),
        SAMPLES,
        EXPOSURE_DEPTH,
    )
    .unwrap();
    netted
        .build(&mut collateralised_cube, Some(&collateral))
        .unwrap();

    // xVA on both exposure variants.
    let ns1 = NettingSetId::new("NS1");
    let cp1 = CounterpartyId::new("CP1");
    let bank = CounterpartyId::new("BANK");
    let mut dcfs = Vec::new();
    let mut prev = asof;
    for &date in &grid_dates {
        dcfs.push(DayCountConvention::Act365Fixed.year_fraction(prev, date));
        prev = date;
    }

    for (label, cube) in [("uncollateralised", &netting_cube), ("collateralised", &collateralised_cube)] {
        let calc = IncrementalXvaCalculator::builder(
            asof,
            &trade_cube,
            cube,
            &survival_cube,
            bank.clone(),
        )
        .build()
        .unwrap();
        let cva = calc.netting_set_cva(&ns1, &cp1, 0.4).unwrap();
        let dva = calc.netting_set_dva(&ns1, 0.4).unwrap();
        let fca = calc
            .netting_set_fca(&ns1, Some(&cp1), Some(&bank), &dcfs)
            .unwrap();
        println!("{label:>18}: CVA {cva:>10.2}  DVA {dva:>10.2}  FCA {fca:>10.2}");
    }
}
