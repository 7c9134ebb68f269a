//! Allocation of netting-set exposure back to trades.
//!
//! Netting benefits belong to the netting set, but limits, pricing and
//! reporting often need trade-level numbers. The allocator writes the
//! allocated-EPE/ENE slots of the trade cube from the netting-set cube
//! under one of a closed set of allocation methods. Allocation is the
//! sanctioned overwrite pass on those slots.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use tracing::debug;

use risk_core::cube::{ExposureCube, ExposureMetric};
use risk_core::types::NettingSetId;

use crate::error::XvaError;

/// How netting-set exposure is allocated back to member trades.
///
/// The set is closed and selected at configuration time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AllocationMethod {
    /// No allocation: the allocated slots are left untouched.
    None,
    /// Pro-rata by each trade's share of the netting-set value, per
    /// (date, sample). Zero net value allocates zero.
    Marginal,
    /// Static weights by absolute T0 value (gross).
    RelativeFairValueGross,
    /// Static weights by signed T0 value over the netted T0 value.
    RelativeFairValueNet,
}

impl FromStr for AllocationMethod {
    type Err = XvaError;

    fn from_str(s: &str) -> Result<Self, XvaError> {
        match s {
            "None" => Ok(AllocationMethod::None),
            "Marginal" => Ok(AllocationMethod::Marginal),
            "RelativeFairValueGross" => Ok(AllocationMethod::RelativeFairValueGross),
            "RelativeFairValueNet" => Ok(AllocationMethod::RelativeFairValueNet),
            _ => Err(XvaError::UnknownAllocationMethod(s.to_string())),
        }
    }
}

impl fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AllocationMethod::None => "None",
            AllocationMethod::Marginal => "Marginal",
            AllocationMethod::RelativeFairValueGross => "RelativeFairValueGross",
            AllocationMethod::RelativeFairValueNet => "RelativeFairValueNet",
        };
        write!(f, "{}", s)
    }
}

/// Writes the allocated-EPE/ENE slots of the trade cube.
pub struct ExposureAllocator<'a> {
    netting_cube: &'a ExposureCube,
    memberships: &'a [NettingSetId],
    method: AllocationMethod,
}

impl<'a> ExposureAllocator<'a> {
    /// Creates an allocator for the given netting-set cube and the trade
    /// memberships of the trade cube to be allocated.
    pub fn new(
        netting_cube: &'a ExposureCube,
        memberships: &'a [NettingSetId],
        method: AllocationMethod,
    ) -> Self {
        Self {
            netting_cube,
            memberships,
            method,
        }
    }

    /// Allocates netting-set exposure into the trade cube's allocated
    /// slots.
    ///
    /// # Errors
    ///
    /// Returns an `XvaError` for membership/axis mismatches or a netting
    /// set absent from the netting cube.
    pub fn allocate(&self, trade_cube: &mut ExposureCube) -> Result<(), XvaError> {
        if self.memberships.len() != trade_cube.num_ids() {
            return Err(XvaError::MembershipLength {
                cube: trade_cube.num_ids(),
                memberships: self.memberships.len(),
            });
        }
        if trade_cube.dates() != self.netting_cube.dates() {
            return Err(XvaError::DateCountMismatch {
                left: "trade",
                right: "netting set",
                left_count: trade_cube.num_dates(),
                right_count: self.netting_cube.num_dates(),
            });
        }
        if trade_cube.samples() != self.netting_cube.samples() {
            return Err(XvaError::SampleCountMismatch {
                left: "trade",
                right: "netting set",
                left_count: trade_cube.samples(),
                right_count: self.netting_cube.samples(),
            });
        }
        if self.method == AllocationMethod::None {
            return Ok(());
        }

        let mut members: HashMap<&NettingSetId, Vec<usize>> = HashMap::new();
        for (trade_idx, ns) in self.memberships.iter().enumerate() {
            members.entry(ns).or_default().push(trade_idx);
        }

        let epe = ExposureMetric::Epe.slot();
        let ene = ExposureMetric::Ene.slot();
        let alloc_epe = ExposureMetric::AllocatedEpe.slot();
        let alloc_ene = ExposureMetric::AllocatedEne.slot();
        let num_dates = trade_cube.num_dates();
        let samples = trade_cube.samples();

        for (ns, trade_indices) in &members {
            let ns_idx = self.netting_cube.index_of_id(ns.as_str())?;
            debug!(netting_set = %ns, method = %self.method, "allocating exposure");

            // Weights are computed from a shared view of the trade cube
            // before any allocated slot is written.
            let trades: &ExposureCube = trade_cube;

            let t0_value =
                |t: usize| trades.get_t0(t, epe) - trades.get_t0(t, ene);
            let static_weights: Option<Vec<f64>> = match self.method {
                AllocationMethod::RelativeFairValueGross => {
                    let gross: f64 = trade_indices.iter().map(|&t| t0_value(t).abs()).sum();
                    Some(
                        trade_indices
                            .iter()
                            .map(|&t| {
                                if gross > 0.0 {
                                    t0_value(t).abs() / gross
                                } else {
                                    0.0
                                }
                            })
                            .collect(),
                    )
                }
                AllocationMethod::RelativeFairValueNet => {
                    let net: f64 = trade_indices.iter().map(|&t| t0_value(t)).sum();
                    Some(
                        trade_indices
                            .iter()
                            .map(|&t| if net != 0.0 { t0_value(t) / net } else { 0.0 })
                            .collect(),
                    )
                }
                _ => None,
            };

            let t0_weights =
                self.cell_weights(trade_indices, static_weights.as_deref(), t0_value);

            // Per (date, sample) weights, computed in parallel per date row.
            let rows: Vec<Vec<Vec<f64>>> = (0..num_dates)
                .into_par_iter()
                .map(|date_idx| {
                    (0..samples)
                        .map(|sample| {
                            self.cell_weights(
                                trade_indices,
                                static_weights.as_deref(),
                                |t| {
                                    trades.get(t, date_idx, sample, epe)
                                        - trades.get(t, date_idx, sample, ene)
                                },
                            )
                        })
                        .collect()
                })
                .collect();

            // Write pass over the allocated slots.
            let ns_epe_t0 = self.netting_cube.get_t0(ns_idx, epe);
            let ns_ene_t0 = self.netting_cube.get_t0(ns_idx, ene);
            for (k, &t) in trade_indices.iter().enumerate() {
                trade_cube.set_t0(t0_weights[k] * ns_epe_t0, t, alloc_epe);
                trade_cube.set_t0(t0_weights[k] * ns_ene_t0, t, alloc_ene);
            }
            for (date_idx, row) in rows.iter().enumerate() {
                for (sample, weights) in row.iter().enumerate() {
                    let ns_epe = self.netting_cube.get(ns_idx, date_idx, sample, epe);
                    let ns_ene = self.netting_cube.get(ns_idx, date_idx, sample, ene);
                    for (k, &t) in trade_indices.iter().enumerate() {
                        trade_cube.set(weights[k] * ns_epe, t, date_idx, sample, alloc_epe);
                        trade_cube.set(weights[k] * ns_ene, t, date_idx, sample, alloc_ene);
                    }
                }
            }
        }
        Ok(())
    }

    /// Per-cell allocation weights for one netting set.
    fn cell_weights(
        &self,
        trade_indices: &[usize],
        static_weights: Option<&[f64]>,
        value_of: impl Fn(usize) -> f64,
    ) -> Vec<f64> {
        match self.method {
            AllocationMethod::Marginal => {
                let net: f64 = trade_indices.iter().map(|&t| value_of(t)).sum();
                trade_indices
                    .iter()
                    .map(|&t| if net != 0.0 { value_of(t) / net } else { 0.0 })
                    .collect()
            }
            // Static methods reuse the T0 weights for every cell.
            _ => static_weights
                .map(|w| w.to_vec())
                .unwrap_or_else(|| vec![0.0; trade_indices.len()]),
        }
    }
}
