//! Incremental xVA calculator.
//!
//! Computes CVA, DVA, FBA, FCA, and MVA contributions between two dates
//! from a trade-level exposure cube, a netting-set-level exposure cube, and
//! a counterparty survival-probability cube, plus accumulated totals over
//! the whole grid.
//!
//! # Formulas
//!
//! With `S(c, d, s)` the survival probability of entity `c` at date `d` on
//! sample `s` (1 at the asof date), `EPE`/`ENE` the exposure slots, and `N`
//! the sample count:
//!
//! - CVA increment over `[d0, d1]`:
//!   `(1 − R) · 1/N · Σ_s (S(cpty, d0, s) − S(cpty, d1, s)) · EPE(d1, s)`
//! - DVA increment: own survival and `ENE` in place of counterparty/`EPE`.
//! - FBA/FCA increment:
//!   `dcf · 1/N · Σ_s S(cpty, d0, s) · S(own, d0, s) · ENE/EPE(d1, s)` —
//!   a joint-survival-weighted accrual, not a marginal-default difference:
//!   funding cost/benefit runs as long as neither party has defaulted.
//! - MVA increment: the FCA formula over a posted-initial-margin cube.

use rayon::prelude::*;
use tracing::debug;

use risk_core::cube::{ExposureCube, ExposureMetric, SURVIVAL_SLOT};
use risk_core::types::{CounterpartyId, Date, NettingSetId, TradeId};

use crate::error::XvaError;

/// Builder for [`IncrementalXvaCalculator`].
///
/// Metric slots default to the standard cube layout
/// ([`ExposureMetric::Epe`]/[`ExposureMetric::Ene`] on both exposure cubes,
/// [`SURVIVAL_SLOT`] on the survival and initial-margin cubes).
pub struct IncrementalXvaCalculatorBuilder<'a> {
    asof: Date,
    trade_cube: &'a ExposureCube,
    netting_cube: &'a ExposureCube,
    survival_cube: &'a ExposureCube,
    own_id: CounterpartyId,
    im_cube: Option<&'a ExposureCube>,
    trade_epe_slot: usize,
    trade_ene_slot: usize,
    netting_epe_slot: usize,
    netting_ene_slot: usize,
    survival_slot: usize,
    im_slot: usize,
}

impl<'a> IncrementalXvaCalculatorBuilder<'a> {
    /// Starts a builder over the three mandatory cubes.
    ///
    /// `own_id` names the calculating entity on the survival cube axis,
    /// used for DVA and the own-survival leg of the funding adjustments.
    pub fn new(
        asof: Date,
        trade_cube: &'a ExposureCube,
        netting_cube: &'a ExposureCube,
        survival_cube: &'a ExposureCube,
        own_id: CounterpartyId,
    ) -> Self {
        Self {
            asof,
            trade_cube,
            netting_cube,
            survival_cube,
            own_id,
            im_cube: None,
            trade_epe_slot: ExposureMetric::Epe.slot(),
            trade_ene_slot: ExposureMetric::Ene.slot(),
            netting_epe_slot: ExposureMetric::Epe.slot(),
            netting_ene_slot: ExposureMetric::Ene.slot(),
            survival_slot: SURVIVAL_SLOT,
            im_slot: SURVIVAL_SLOT,
        }
    }

    /// Supplies a posted-initial-margin cube (netting-set keyed) for MVA.
    pub fn with_initial_margin_cube(mut self, cube: &'a ExposureCube) -> Self {
        self.im_cube = Some(cube);
        self
    }

    /// Overrides the EPE/ENE slots of the trade cube.
    pub fn with_trade_slots(mut self, epe: usize, ene: usize) -> Self {
        self.trade_epe_slot = epe;
        self.trade_ene_slot = ene;
        self
    }

    /// Overrides the EPE/ENE slots of the netting-set cube.
    pub fn with_netting_slots(mut self, epe: usize, ene: usize) -> Self {
        self.netting_epe_slot = epe;
        self.netting_ene_slot = ene;
        self
    }

    /// Overrides the survival-probability slot.
    pub fn with_survival_slot(mut self, slot: usize) -> Self {
        self.survival_slot = slot;
        self
    }

    /// Overrides the initial-margin slot.
    pub fn with_initial_margin_slot(mut self, slot: usize) -> Self {
        self.im_slot = slot;
        self
    }

    /// Validates the cube geometry and builds the calculator.
    ///
    /// # Errors
    ///
    /// Returns an `XvaError` if the cubes disagree on date axes or sample
    /// counts, or a slot exceeds its cube's depth.
    pub fn build(self) -> Result<IncrementalXvaCalculator<'a>, XvaError> {
        check_axes("trade", self.trade_cube, "survival", self.survival_cube)?;
        check_axes("netting set", self.netting_cube, "survival", self.survival_cube)?;
        if let Some(im) = self.im_cube {
            check_axes("initial margin", im, "survival", self.survival_cube)?;
        }

        check_slot("trade", self.trade_cube, self.trade_epe_slot)?;
        check_slot("trade", self.trade_cube, self.trade_ene_slot)?;
        check_slot("netting set", self.netting_cube, self.netting_epe_slot)?;
        check_slot("netting set", self.netting_cube, self.netting_ene_slot)?;
        check_slot("survival", self.survival_cube, self.survival_slot)?;
        if let Some(im) = self.im_cube {
            check_slot("initial margin", im, self.im_slot)?;
        }

        Ok(IncrementalXvaCalculator {
            asof: self.asof,
            trade_cube: self.trade_cube,
            netting_cube: self.netting_cube,
            survival_cube: self.survival_cube,
            own_id: self.own_id,
            im_cube: self.im_cube,
            trade_epe_slot: self.trade_epe_slot,
            trade_ene_slot: self.trade_ene_slot,
            netting_epe_slot: self.netting_epe_slot,
            netting_ene_slot: self.netting_ene_slot,
            survival_slot: self.survival_slot,
            im_slot: self.im_slot,
        })
    }
}

fn check_axes(
    left_name: &'static str,
    left: &ExposureCube,
    right_name: &'static str,
    right: &ExposureCube,
) -> Result<(), XvaError> {
    if left.num_dates() != right.num_dates() {
        return Err(XvaError::DateCountMismatch {
            left: left_name,
            right: right_name,
            left_count: left.num_dates(),
            right_count: right.num_dates(),
        });
    }
    for (i, (l, r)) in left.dates().iter().zip(right.dates()).enumerate() {
        if l != r {
            return Err(XvaError::DateValueMismatch {
                left: left_name,
                right: right_name,
                index: i,
                left_date: *l,
                right_date: *r,
            });
        }
    }
    if left.samples() != right.samples() {
        return Err(XvaError::SampleCountMismatch {
            left: left_name,
            right: right_name,
            left_count: left.samples(),
            right_count: right.samples(),
        });
    }
    Ok(())
}

fn check_slot(name: &'static str, cube: &ExposureCube, slot: usize) -> Result<(), XvaError> {
    if slot >= cube.depth() {
        return Err(XvaError::SlotOutOfRange {
            cube: name,
            slot,
            depth: cube.depth(),
        });
    }
    Ok(())
}

/// Computes incremental and accumulated valuation adjustments from
/// exposure and survival cubes.
///
/// All operations are pure reads; absent ids or dates fail loudly as
/// configuration errors.
pub struct IncrementalXvaCalculator<'a> {
    asof: Date,
    trade_cube: &'a ExposureCube,
    netting_cube: &'a ExposureCube,
    survival_cube: &'a ExposureCube,
    own_id: CounterpartyId,
    im_cube: Option<&'a ExposureCube>,
    trade_epe_slot: usize,
    trade_ene_slot: usize,
    netting_epe_slot: usize,
    netting_ene_slot: usize,
    survival_slot: usize,
    im_slot: usize,
}

impl<'a> IncrementalXvaCalculator<'a> {
    /// Starts building a calculator.
    pub fn builder(
        asof: Date,
        trade_cube: &'a ExposureCube,
        netting_cube: &'a ExposureCube,
        survival_cube: &'a ExposureCube,
        own_id: CounterpartyId,
    ) -> IncrementalXvaCalculatorBuilder<'a> {
        IncrementalXvaCalculatorBuilder::new(asof, trade_cube, netting_cube, survival_cube, own_id)
    }

    /// Returns the asof date ("today") of the calculator.
    #[inline]
    pub fn asof(&self) -> Date {
        self.asof
    }

    /// Returns the shared date grid of the cubes.
    #[inline]
    pub fn dates(&self) -> &[Date] {
        self.trade_cube.dates()
    }

    fn survival_index(&self, entity: &str) -> Result<usize, XvaError> {
        Ok(self.survival_cube.index_of_id(entity)?)
    }

    /// Survival probability of an entity index at a date index, 1 at asof.
    fn survival_at(
        &self,
        entity_idx: Option<usize>,
        date_idx: Option<usize>,
        sample: usize,
    ) -> f64 {
        match (entity_idx, date_idx) {
            (Some(e), Some(d)) => self.survival_cube.get(e, d, sample, self.survival_slot),
            // Empty entity or the asof date: no default can be in effect.
            _ => 1.0,
        }
    }

    fn date_index(&self, date: Date) -> Result<Option<usize>, XvaError> {
        if date == self.asof {
            Ok(None)
        } else {
            Ok(Some(self.survival_cube.index_of_date(date)?))
        }
    }

    /// Marginal-default-probability-weighted expected exposure over
    /// `[d0, d1]`, averaged over samples.
    fn default_weighted(
        &self,
        cube: &ExposureCube,
        entity_idx: usize,
        exposure_slot: usize,
        survival_entity_idx: usize,
        d0: Date,
        d1: Date,
    ) -> Result<f64, XvaError> {
        let d0_idx = self.date_index(d0)?;
        let d1_idx = cube.index_of_date(d1)?;
        let samples = cube.samples();

        let sum: f64 = (0..samples)
            .into_par_iter()
            .map(|s| {
                let s0 = self.survival_at(Some(survival_entity_idx), d0_idx, s);
                let s1 = self.survival_at(Some(survival_entity_idx), Some(d1_idx), s);
                (s0 - s1) * cube.get(entity_idx, d1_idx, s, exposure_slot)
            })
            .sum();
        Ok(sum / samples as f64)
    }

    /// Joint-survival-weighted exposure at `d1` with both survival factors
    /// taken at `d0`, averaged over samples.
    fn joint_survival_weighted(
        &self,
        cube: &ExposureCube,
        entity_idx: usize,
        exposure_slot: usize,
        cpty: Option<&CounterpartyId>,
        own: Option<&CounterpartyId>,
        d0: Date,
        d1: Date,
    ) -> Result<f64, XvaError> {
        let d0_idx = self.date_index(d0)?;
        let d1_idx = cube.index_of_date(d1)?;
        let cpty_idx = cpty.map(|c| self.survival_index(c.as_str())).transpose()?;
        let own_idx = own.map(|c| self.survival_index(c.as_str())).transpose()?;
        let samples = cube.samples();

        let sum: f64 = (0..samples)
            .into_par_iter()
            .map(|s| {
                let sc = self.survival_at(cpty_idx, d0_idx, s);
                let so = self.survival_at(own_idx, d0_idx, s);
                sc * so * cube.get(entity_idx, d1_idx, s, exposure_slot)
            })
            .sum();
        Ok(sum / samples as f64)
    }

    /// CVA contribution of a trade over `[d0, d1]`.
    ///
    /// `d0` may be the asof date (survival 1); `d1` must lie on the grid.
    pub fn cva_increment(
        &self,
        trade: &TradeId,
        counterparty: &CounterpartyId,
        d0: Date,
        d1: Date,
        recovery_rate: f64,
    ) -> Result<f64, XvaError> {
        let trade_idx = self.trade_cube.index_of_id(trade.as_str())?;
        let cpty_idx = self.survival_index(counterparty.as_str())?;
        let weighted = self.default_weighted(
            self.trade_cube,
            trade_idx,
            self.trade_epe_slot,
            cpty_idx,
            d0,
            d1,
        )?;
        Ok((1.0 - recovery_rate) * weighted)
    }

    /// DVA contribution of a trade over `[d0, d1]`: the calculating
    /// entity's own default weighted against the negative exposure.
    pub fn dva_increment(
        &self,
        trade: &TradeId,
        d0: Date,
        d1: Date,
        recovery_rate: f64,
    ) -> Result<f64, XvaError> {
        let trade_idx = self.trade_cube.index_of_id(trade.as_str())?;
        let own_idx = self.survival_index(self.own_id.as_str())?;
        let weighted = self.default_weighted(
            self.trade_cube,
            trade_idx,
            self.trade_ene_slot,
            own_idx,
            d0,
            d1,
        )?;
        Ok((1.0 - recovery_rate) * weighted)
    }

    /// CVA contribution of a netting set over `[d0, d1]`.
    pub fn netting_set_cva_increment(
        &self,
        netting_set: &NettingSetId,
        counterparty: &CounterpartyId,
        d0: Date,
        d1: Date,
        recovery_rate: f64,
    ) -> Result<f64, XvaError> {
        let ns_idx = self.netting_cube.index_of_id(netting_set.as_str())?;
        let cpty_idx = self.survival_index(counterparty.as_str())?;
        let weighted = self.default_weighted(
            self.netting_cube,
            ns_idx,
            self.netting_epe_slot,
            cpty_idx,
            d0,
            d1,
        )?;
        Ok((1.0 - recovery_rate) * weighted)
    }

    /// DVA contribution of a netting set over `[d0, d1]`.
    pub fn netting_set_dva_increment(
        &self,
        netting_set: &NettingSetId,
        d0: Date,
        d1: Date,
        recovery_rate: f64,
    ) -> Result<f64, XvaError> {
        let ns_idx = self.netting_cube.index_of_id(netting_set.as_str())?;
        let own_idx = self.survival_index(self.own_id.as_str())?;
        let weighted = self.default_weighted(
            self.netting_cube,
            ns_idx,
            self.netting_ene_slot,
            own_idx,
            d0,
            d1,
        )?;
        Ok((1.0 - recovery_rate) * weighted)
    }

    /// Funding benefit accrual of a trade over `[d0, d1]`.
    ///
    /// Either survival factor is 1 when its id is `None` or `d0` is the
    /// asof date.
    pub fn fba_increment(
        &self,
        trade: &TradeId,
        counterparty: Option<&CounterpartyId>,
        own: Option<&CounterpartyId>,
        d0: Date,
        d1: Date,
        day_count_fraction: f64,
    ) -> Result<f64, XvaError> {
        let trade_idx = self.trade_cube.index_of_id(trade.as_str())?;
        let weighted = self.joint_survival_weighted(
            self.trade_cube,
            trade_idx,
            self.trade_ene_slot,
            counterparty,
            own,
            d0,
            d1,
        )?;
        Ok(day_count_fraction * weighted)
    }

    /// Funding cost accrual of a trade over `[d0, d1]`.
    pub fn fca_increment(
        &self,
        trade: &TradeId,
        counterparty: Option<&CounterpartyId>,
        own: Option<&CounterpartyId>,
        d0: Date,
        d1: Date,
        day_count_fraction: f64,
    ) -> Result<f64, XvaError> {
        let trade_idx = self.trade_cube.index_of_id(trade.as_str())?;
        let weighted = self.joint_survival_weighted(
            self.trade_cube,
            trade_idx,
            self.trade_epe_slot,
            counterparty,
            own,
            d0,
            d1,
        )?;
        Ok(day_count_fraction * weighted)
    }

    /// Funding benefit accrual of a netting set over `[d0, d1]`.
    pub fn netting_set_fba_increment(
        &self,
        netting_set: &NettingSetId,
        counterparty: Option<&CounterpartyId>,
        own: Option<&CounterpartyId>,
        d0: Date,
        d1: Date,
        day_count_fraction: f64,
    ) -> Result<f64, XvaError> {
        let ns_idx = self.netting_cube.index_of_id(netting_set.as_str())?;
        let weighted = self.joint_survival_weighted(
            self.netting_cube,
            ns_idx,
            self.netting_ene_slot,
            counterparty,
            own,
            d0,
            d1,
        )?;
        Ok(day_count_fraction * weighted)
    }

    /// Funding cost accrual of a netting set over `[d0, d1]`.
    pub fn netting_set_fca_increment(
        &self,
        netting_set: &NettingSetId,
        counterparty: Option<&CounterpartyId>,
        own: Option<&CounterpartyId>,
        d0: Date,
        d1: Date,
        day_count_fraction: f64,
    ) -> Result<f64, XvaError> {
        let ns_idx = self.netting_cube.index_of_id(netting_set.as_str())?;
        let weighted = self.joint_survival_weighted(
            self.netting_cube,
            ns_idx,
            self.netting_epe_slot,
            counterparty,
            own,
            d0,
            d1,
        )?;
        Ok(day_count_fraction * weighted)
    }

    /// Cost of funding posted regulatory initial margin over `[d0, d1]`:
    /// the joint-survival weighting applied to the initial-margin cube.
    ///
    /// # Errors
    ///
    /// Returns `XvaError::MissingInitialMarginCube` unless an
    /// initial-margin cube was supplied at construction.
    pub fn netting_set_mva_increment(
        &self,
        netting_set: &NettingSetId,
        counterparty: Option<&CounterpartyId>,
        own: Option<&CounterpartyId>,
        d0: Date,
        d1: Date,
        day_count_fraction: f64,
    ) -> Result<f64, XvaError> {
        let im_cube = self.im_cube.ok_or(XvaError::MissingInitialMarginCube)?;
        let ns_idx = im_cube.index_of_id(netting_set.as_str())?;
        let weighted = self.joint_survival_weighted(
            im_cube,
            ns_idx,
            self.im_slot,
            counterparty,
            own,
            d0,
            d1,
        )?;
        Ok(day_count_fraction * weighted)
    }

    fn intervals(&self) -> impl Iterator<Item = (Date, Date)> + '_ {
        let dates = self.trade_cube.dates();
        (0..dates.len()).map(move |j| {
            let d0 = if j == 0 { self.asof } else { dates[j - 1] };
            (d0, dates[j])
        })
    }

    fn check_dcfs(&self, dcfs: &[f64]) -> Result<(), XvaError> {
        if dcfs.len() != self.trade_cube.num_dates() {
            return Err(XvaError::DayCountLength {
                expected: self.trade_cube.num_dates(),
                actual: dcfs.len(),
            });
        }
        Ok(())
    }

    /// Accumulated trade CVA over the whole grid.
    pub fn trade_cva(
        &self,
        trade: &TradeId,
        counterparty: &CounterpartyId,
        recovery_rate: f64,
    ) -> Result<f64, XvaError> {
        debug!(trade = %trade, counterparty = %counterparty, "accumulating trade CVA");
        let mut total = 0.0;
        for (d0, d1) in self.intervals() {
            total += self.cva_increment(trade, counterparty, d0, d1, recovery_rate)?;
        }
        Ok(total)
    }

    /// Accumulated trade DVA over the whole grid.
    pub fn trade_dva(&self, trade: &TradeId, recovery_rate: f64) -> Result<f64, XvaError> {
        let mut total = 0.0;
        for (d0, d1) in self.intervals() {
            total += self.dva_increment(trade, d0, d1, recovery_rate)?;
        }
        Ok(total)
    }

    /// Accumulated netting-set CVA over the whole grid.
    pub fn netting_set_cva(
        &self,
        netting_set: &NettingSetId,
        counterparty: &CounterpartyId,
        recovery_rate: f64,
    ) -> Result<f64, XvaError> {
        let mut total = 0.0;
        for (d0, d1) in self.intervals() {
            total +=
                self.netting_set_cva_increment(netting_set, counterparty, d0, d1, recovery_rate)?;
        }
        Ok(total)
    }

    /// Accumulated netting-set DVA over the whole grid.
    pub fn netting_set_dva(
        &self,
        netting_set: &NettingSetId,
        recovery_rate: f64,
    ) -> Result<f64, XvaError> {
        let mut total = 0.0;
        for (d0, d1) in self.intervals() {
            total += self.netting_set_dva_increment(netting_set, d0, d1, recovery_rate)?;
        }
        Ok(total)
    }

    /// Accumulated trade FBA with one day-count fraction per grid interval.
    pub fn trade_fba(
        &self,
        trade: &TradeId,
        counterparty: Option<&CounterpartyId>,
        own: Option<&CounterpartyId>,
        dcfs: &[f64],
    ) -> Result<f64, XvaError> {
        self.check_dcfs(dcfs)?;
        let mut total = 0.0;
        for ((d0, d1), dcf) in self.intervals().zip(dcfs) {
            total += self.fba_increment(trade, counterparty, own, d0, d1, *dcf)?;
        }
        Ok(total)
    }

    /// Accumulated trade FCA with one day-count fraction per grid interval.
    pub fn trade_fca(
        &self,
        trade: &TradeId,
        counterparty: Option<&CounterpartyId>,
        own: Option<&CounterpartyId>,
        dcfs: &[f64],
    ) -> Result<f64, XvaError> {
        self.check_dcfs(dcfs)?;
        let mut total = 0.0;
        for ((d0, d1), dcf) in self.intervals().zip(dcfs) {
            total += self.fca_increment(trade, counterparty, own, d0, d1, *dcf)?;
        }
        Ok(total)
    }

    /// Accumulated netting-set FBA.
    pub fn netting_set_fba(
        &self,
        netting_set: &NettingSetId,
        counterparty: Option<&CounterpartyId>,
        own: Option<&CounterpartyId>,
        dcfs: &[f64],
    ) -> Result<f64, XvaError> {
        self.check_dcfs(dcfs)?;
        let mut total = 0.0;
        for ((d0, d1), dcf) in self.intervals().zip(dcfs) {
            total += self.netting_set_fba_increment(netting_set, counterparty, own, d0, d1, *dcf)?;
        }
        Ok(total)
    }

    /// Accumulated netting-set FCA.
    pub fn netting_set_fca(
        &self,
        netting_set: &NettingSetId,
        counterparty: Option<&CounterpartyId>,
        own: Option<&CounterpartyId>,
        dcfs: &[f64],
    ) -> Result<f64, XvaError> {
        self.check_dcfs(dcfs)?;
        let mut total = 0.0;
        for ((d0, d1), dcf) in self.intervals().zip(dcfs) {
            total += self.netting_set_fca_increment(netting_set, counterparty, own, d0, d1, *dcf)?;
        }
        Ok(total)
    }

    /// Accumulated netting-set MVA.
    pub fn netting_set_mva(
        &self,
        netting_set: &NettingSetId,
        counterparty: Option<&CounterpartyId>,
        own: Option<&CounterpartyId>,
        dcfs: &[f64],
    ) -> Result<f64, XvaError> {
        self.check_dcfs(dcfs)?;
        let mut total = 0.0;
        for ((d0, d1), dcf) in self.intervals().zip(dcfs) {
            total += self.netting_set_mva_increment(netting_set, counterparty, own, d0, d1, *dcf)?;
        }
        Ok(total)
    }
}
