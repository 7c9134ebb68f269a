//! Netting-set exposure aggregation.
//!
//! Aggregates the trade-level exposure cube into the netting-set cube:
//! per (netting set, date, sample) the member trades' values are netted,
//! optionally reduced by that scenario's collateral balance, and split into
//! positive and negative parts. The trade cube's EPE/ENE slots hold the
//! positive and negative parts of each trade value, so the signed value is
//! recovered as `EPE − ENE`.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::debug;

use risk_collateral::account::CollateralAccount;
use risk_core::cube::{ExposureCube, ExposureMetric};
use risk_core::types::NettingSetId;

use crate::error::XvaError;

/// Builds the netting-set exposure cube from the trade exposure cube.
pub struct NettedExposureCalculator<'a> {
    trade_cube: &'a ExposureCube,
    memberships: &'a [NettingSetId],
    trade_epe_slot: usize,
    trade_ene_slot: usize,
}

impl<'a> NettedExposureCalculator<'a> {
    /// Creates a calculator over a trade cube and its netting-set
    /// memberships (`memberships[i]` is the netting set of trade cube
    /// entity `i`).
    ///
    /// # Errors
    ///
    /// Returns `XvaError::MembershipLength` if the membership list does not
    /// cover the trade cube's entity axis.
    pub fn new(
        trade_cube: &'a ExposureCube,
        memberships: &'a [NettingSetId],
    ) -> Result<Self, XvaError> {
        if memberships.len() != trade_cube.num_ids() {
            return Err(XvaError::MembershipLength {
                cube: trade_cube.num_ids(),
                memberships: memberships.len(),
            });
        }
        Ok(Self {
            trade_cube,
            memberships,
            trade_epe_slot: ExposureMetric::Epe.slot(),
            trade_ene_slot: ExposureMetric::Ene.slot(),
        })
    }

    /// Overrides the EPE/ENE slots read from the trade cube.
    pub fn with_trade_slots(mut self, epe: usize, ene: usize) -> Self {
        self.trade_epe_slot = epe;
        self.trade_ene_slot = ene;
        self
    }

    fn members_by_netting_set(&self) -> HashMap<&NettingSetId, Vec<usize>> {
        let mut members: HashMap<&NettingSetId, Vec<usize>> = HashMap::new();
        for (trade_idx, ns) in self.memberships.iter().enumerate() {
            members.entry(ns).or_default().push(trade_idx);
        }
        members
    }

    /// Fills `netting_cube` with the netted (and optionally
    /// collateral-adjusted) EPE/ENE per netting set.
    ///
    /// `collateral` maps a netting set to its per-scenario collateral
    /// accounts (one per sample, as produced by
    /// [`risk_collateral::exposure::collateral_balance_paths`]); the
    /// balance as of each grid date is subtracted from the netted value
    /// before the positive/negative split. Netting sets without an entry
    /// are treated as uncollateralised.
    ///
    /// # Errors
    ///
    /// Returns an `XvaError` if the netting cube's axes disagree with the
    /// trade cube, a membership names a netting set absent from the
    /// netting cube, or a collateral path set has the wrong scenario count.
    pub fn build(
        &self,
        netting_cube: &mut ExposureCube,
        collateral: Option<&HashMap<NettingSetId, Vec<CollateralAccount>>>,
    ) -> Result<(), XvaError> {
        if netting_cube.num_dates() != self.trade_cube.num_dates()
            || netting_cube.dates() != self.trade_cube.dates()
        {
            return Err(XvaError::DateCountMismatch {
                left: "netting set",
                right: "trade",
                left_count: netting_cube.num_dates(),
                right_count: self.trade_cube.num_dates(),
            });
        }
        if netting_cube.samples() != self.trade_cube.samples() {
            return Err(XvaError::SampleCountMismatch {
                left: "netting set",
                right: "trade",
                left_count: netting_cube.samples(),
                right_count: self.trade_cube.samples(),
            });
        }

        let members = self.members_by_netting_set();
        let num_dates = self.trade_cube.num_dates();
        let samples = self.trade_cube.samples();
        let epe_out = ExposureMetric::Epe.slot();
        let ene_out = ExposureMetric::Ene.slot();

        for (ns, trade_indices) in &members {
            let ns_idx = netting_cube.index_of_id(ns.as_str())?;
            let accounts = match collateral.and_then(|m| m.get(*ns)) {
                Some(accounts) if accounts.len() != samples => {
                    return Err(XvaError::CollateralPathCount {
                        netting_set: ns.as_str().to_string(),
                        expected: samples,
                        actual: accounts.len(),
                    });
                }
                other => other,
            };
            debug!(
                netting_set = %ns,
                trades = trade_indices.len(),
                collateralised = accounts.is_some(),
                "netting trade exposures"
            );

            // T0: net the deterministic values; the collateral balance at
            // the open date is the seeded t0 margin, shared by every path.
            let net_t0: f64 = trade_indices
                .iter()
                .map(|&t| {
                    self.trade_cube.get_t0(t, self.trade_epe_slot)
                        - self.trade_cube.get_t0(t, self.trade_ene_slot)
                })
                .sum();
            let t0_balance = accounts
                .and_then(|a| a.first())
                .map(|account| account.balance_as_of(account.open_date()))
                .unwrap_or(0.0);
            let adjusted_t0 = net_t0 - t0_balance;
            netting_cube.set_t0(adjusted_t0.max(0.0), ns_idx, epe_out);
            netting_cube.set_t0((-adjusted_t0).max(0.0), ns_idx, ene_out);

            // Per (date, sample): rows computed in parallel, written after.
            let dates = self.trade_cube.dates();
            let rows: Vec<Vec<(f64, f64)>> = (0..num_dates)
                .into_par_iter()
                .map(|date_idx| {
                    (0..samples)
                        .map(|sample| {
                            let net: f64 = trade_indices
                                .iter()
                                .map(|&t| {
                                    self.trade_cube.get(t, date_idx, sample, self.trade_epe_slot)
                                        - self.trade_cube.get(
                                            t,
                                            date_idx,
                                            sample,
                                            self.trade_ene_slot,
                                        )
                                })
                                .sum();
                            let balance = accounts
                                .map(|a| a[sample].balance_as_of(dates[date_idx]))
                                .unwrap_or(0.0);
                            let adjusted = net - balance;
                            (adjusted.max(0.0), (-adjusted).max(0.0))
                        })
                        .collect()
                })
                .collect();

            for (date_idx, row) in rows.iter().enumerate() {
                for (sample, &(epe, ene)) in row.iter().enumerate() {
                    netting_cube.set(epe, ns_idx, date_idx, sample, epe_out);
                    netting_cube.set(ene, ns_idx, date_idx, sample, ene_out);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    use risk_collateral::agreement::CollateralAgreement;
    use risk_core::cube::EXPOSURE_DEPTH;
    use risk_core::types::Date;

    fn d(y: i32, m: u32, day: u32) -> Date {
        Date::from_ymd(y, m, day).unwrap()
    }

    fn grid() -> Vec<Date> {
        vec![d(2024, 12, 14), d(2025, 6, 14)]
    }

    /// Two trades in NS1 (values +100 and -40), one trade in NS2 (+25).
    fn trade_cube() -> (ExposureCube, Vec<NettingSetId>) {
        let mut cube = ExposureCube::new(
            vec!["T1".to_string(), "T2".to_string(), "T3".to_string()],
            grid(),
            2,
            EXPOSURE_DEPTH,
        )
        .unwrap();
        let epe = ExposureMetric::Epe.slot();
        let ene = ExposureMetric::Ene.slot();
        for date_idx in 0..2 {
            for sample in 0..2 {
                cube.set(100.0, 0, date_idx, sample, epe);
                cube.set(40.0, 1, date_idx, sample, ene);
                cube.set(25.0, 2, date_idx, sample, epe);
            }
        }
        cube.set_t0(100.0, 0, epe);
        cube.set_t0(40.0, 1, ene);
        cube.set_t0(25.0, 2, epe);

        let memberships = vec![
            NettingSetId::new("NS1"),
            NettingSetId::new("NS1"),
            NettingSetId::new("NS2"),
        ];
        (cube, memberships)
    }

    fn netting_cube() -> ExposureCube {
        ExposureCube::new(
            vec!["NS1".to_string(), "NS2".to_string()],
            grid(),
            2,
            EXPOSURE_DEPTH,
        )
        .unwrap()
    }

    #[test]
    fn test_netting_without_collateral() {
        let (trades, memberships) = trade_cube();
        let calc = NettedExposureCalculator::new(&trades, &memberships).unwrap();
        let mut netting = netting_cube();
        calc.build(&mut netting, None).unwrap();

        let epe = ExposureMetric::Epe.slot();
        let ene = ExposureMetric::Ene.slot();
        // NS1 nets +100 - 40 = +60.
        assert_relative_eq!(netting.get(0, 0, 0, epe), 60.0, epsilon = 1e-12);
        assert_eq!(netting.get(0, 0, 0, ene), 0.0);
        assert_relative_eq!(netting.get_t0(0, epe), 60.0, epsilon = 1e-12);
        // NS2 is the single +25 trade.
        assert_relative_eq!(netting.get(1, 1, 1, epe), 25.0, epsilon = 1e-12);
    }

    #[test]
    fn test_netting_with_collateral_balances() {
        let (trades, memberships) = trade_cube();
        let calc = NettedExposureCalculator::new(&trades, &memberships).unwrap();
        let mut netting = netting_cube();

        // Hand-built accounts: one per sample, balance 50 held from t0.
        let agreement = Arc::new(CollateralAgreement::builder().build().unwrap());
        let open = d(2024, 6, 14);
        let accounts: Vec<CollateralAccount> = (0..2)
            .map(|_| CollateralAccount::new(agreement.clone(), 50.0, open))
            .collect();
        let mut collateral = HashMap::new();
        collateral.insert(NettingSetId::new("NS1"), accounts);

        calc.build(&mut netting, Some(&collateral)).unwrap();

        let epe = ExposureMetric::Epe.slot();
        // NS1: 60 net, 50 collateral held: 10 residual exposure.
        assert_relative_eq!(netting.get(0, 0, 0, epe), 10.0, epsilon = 1e-12);
        assert_relative_eq!(netting.get_t0(0, epe), 10.0, epsilon = 1e-12);
        // NS2 uncollateralised.
        assert_relative_eq!(netting.get(1, 0, 0, epe), 25.0, epsilon = 1e-12);
    }

    #[test]
    fn test_overcollateralised_set_shows_negative_exposure() {
        let (trades, memberships) = trade_cube();
        let calc = NettedExposureCalculator::new(&trades, &memberships).unwrap();
        let mut netting = netting_cube();

        let agreement = Arc::new(CollateralAgreement::builder().build().unwrap());
        let open = d(2024, 6, 14);
        let accounts: Vec<CollateralAccount> = (0..2)
            .map(|_| CollateralAccount::new(agreement.clone(), 100.0, open))
            .collect();
        let mut collateral = HashMap::new();
        collateral.insert(NettingSetId::new("NS1"), accounts);

        calc.build(&mut netting, Some(&collateral)).unwrap();

        // 60 net against 100 held: we owe 40 back.
        assert_relative_eq!(
            netting.get(0, 0, 0, ExposureMetric::Ene.slot()),
            40.0,
            epsilon = 1e-12
        );
        assert_eq!(netting.get(0, 0, 0, ExposureMetric::Epe.slot()), 0.0);
    }

    #[test]
    fn test_membership_length_checked() {
        let (trades, _) = trade_cube();
        let short = vec![NettingSetId::new("NS1")];
        assert!(matches!(
            NettedExposureCalculator::new(&trades, &short),
            Err(XvaError::MembershipLength { .. })
        ));
    }

    #[test]
    fn test_unknown_netting_set_fails() {
        let (trades, _) = trade_cube();
        let memberships = vec![
            NettingSetId::new("NS1"),
            NettingSetId::new("NS1"),
            NettingSetId::new("NS9"),
        ];
        let calc = NettedExposureCalculator::new(&trades, &memberships).unwrap();
        let mut netting = netting_cube();
        assert!(calc.build(&mut netting, None).is_err());
    }

    #[test]
    fn test_collateral_path_count_checked() {
        let (trades, memberships) = trade_cube();
        let calc = NettedExposureCalculator::new(&trades, &memberships).unwrap();
        let mut netting = netting_cube();

        let agreement = Arc::new(CollateralAgreement::builder().build().unwrap());
        let accounts = vec![CollateralAccount::new(agreement, 0.0, d(2024, 6, 14))];
        let mut collateral = HashMap::new();
        collateral.insert(NettingSetId::new("NS1"), accounts);

        assert!(matches!(
            calc.build(&mut netting, Some(&collateral)),
            Err(XvaError::CollateralPathCount { .. })
        ));
    }

    #[test]
    fn test_sample_mismatch_rejected() {
        let (trades, memberships) = trade_cube();
        let calc = NettedExposureCalculator::new(&trades, &memberships).unwrap();
        let mut wrong = ExposureCube::new(
            vec!["NS1".to_string(), "NS2".to_string()],
            grid(),
            3,
            EXPOSURE_DEPTH,
        )
        .unwrap();
        assert!(matches!(
            calc.build(&mut wrong, None),
            Err(XvaError::SampleCountMismatch { .. })
        ));
    }
}
