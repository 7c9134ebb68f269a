//! Collateral exposure helpers: margin requirement, exposure estimation
//! between grid dates, and per-scenario collateral balance path generation.
//!
//! # Interpolation policy
//!
//! [`estimate_exposure_at`] answers queries between simulation grid dates
//! with a right-continuous step function (the value at the next grid knot),
//! flat-extrapolated beyond both ends of the grid. This is the policy the
//! downstream exposure aggregation is validated against; no linear
//! interpolation is performed.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use risk_core::types::Date;

use crate::account::CollateralAccount;
use crate::agreement::{CalculationType, CollateralAgreement};
use crate::error::CollateralError;

/// Credit support amount of an agreement at an uncollateralised value.
///
/// With `ia` the independent amount held and `v` the uncollateralised value
/// in the collateral currency:
///
/// - `v − ia ≥ 0`: `max(v − ia − threshold_rcv, 0)` (we may call),
/// - `v − ia < 0`: `min(v − ia + threshold_pay, 0)` (they may call).
///
/// The change of sign on the threshold between the two branches reflects
/// the opposite conventions of receive- and pay-side thresholds.
pub fn credit_support_amount(agreement: &CollateralAgreement, uncollat_value: f64) -> f64 {
    let pivot = uncollat_value - agreement.independent_amount_held();
    if pivot >= 0.0 {
        (pivot - agreement.threshold_rcv()).max(0.0)
    } else {
        (pivot + agreement.threshold_pay()).min(0.0)
    }
}

/// Margin delivery amount due at `as_of` given the account state.
///
/// The shortfall is the credit support amount less the current balance and
/// any posted-but-unsettled margin. Shortfalls below the applicable minimum
/// transfer amount (receive-side MTA for non-negative shortfalls, pay-side
/// otherwise) are not called.
///
/// Returns a signed amount: positive means we receive collateral, negative
/// means we post, exactly zero below the MTA.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use risk_core::types::Date;
/// use risk_collateral::account::CollateralAccount;
/// use risk_collateral::agreement::CollateralAgreement;
/// use risk_collateral::exposure::margin_requirement;
///
/// let csa = Arc::new(
///     CollateralAgreement::builder()
///         .threshold_rcv(100.0)
///         .threshold_pay(100.0)
///         .mta_rcv(10.0)
///         .mta_pay(10.0)
///         .build()
///         .unwrap(),
/// );
/// let t0 = Date::from_ymd(2024, 6, 14).unwrap();
/// let account = CollateralAccount::new(csa, 0.0, t0);
///
/// // 150 over a 100 threshold: call for the 50 excess.
/// assert_eq!(margin_requirement(&account, 150.0, t0), 50.0);
/// // 105 leaves a 5 shortfall, below the 10 MTA: no call.
/// assert_eq!(margin_requirement(&account, 105.0, t0), 0.0);
/// ```
pub fn margin_requirement(account: &CollateralAccount, uncollat_value: f64, as_of: Date) -> f64 {
    let csa = credit_support_amount(account.agreement(), uncollat_value);
    let open_margin = account.outstanding_margin_amount(as_of);
    let shortfall = csa - account.balance() - open_margin;

    let mta = if shortfall >= 0.0 {
        account.agreement().mta_rcv()
    } else {
        account.agreement().mta_pay()
    };

    if shortfall.abs() >= mta {
        shortfall
    } else {
        0.0
    }
}

/// Estimates a per-scenario profile value at an arbitrary evaluation date.
///
/// `profile` is indexed `[date_idx][sample]` on `grid`; `value_t0` is the
/// deterministic time-zero value. The policy, in order:
///
/// 1. `date ≥ last grid date`: flat extrapolation of the last grid value.
/// 2. `date == t0`: the time-zero value.
/// 3. `date` on the grid: that grid value.
/// 4. `date` before the first grid date: flat backward extrapolation.
/// 5. `date` strictly inside `(grid[i], grid[i+1])`: the value at
///    `grid[i+1]` (right-continuous step function).
///
/// # Errors
///
/// Returns a `CollateralError` for an empty or misshapen profile, an
/// out-of-range sample, an evaluation date before `t0`, or a grid starting
/// before `t0`.
pub fn estimate_exposure_at(
    date: Date,
    value_t0: f64,
    t0: Date,
    profile: &[Vec<f64>],
    sample: usize,
    grid: &[Date],
) -> Result<f64, CollateralError> {
    if grid.is_empty() || profile.is_empty() {
        return Err(CollateralError::EmptyProfile("exposure"));
    }
    if profile.len() != grid.len() {
        return Err(CollateralError::ProfileShape {
            field: "exposure",
            expected: grid.len(),
            actual: profile.len(),
        });
    }
    if date < t0 {
        return Err(CollateralError::DateBeforeStart { date, t0 });
    }
    if grid[0] < t0 {
        return Err(CollateralError::GridPrecedesStart { first: grid[0], t0 });
    }

    let at = |date_idx: usize| -> Result<f64, CollateralError> {
        let row = &profile[date_idx];
        row.get(sample)
            .copied()
            .ok_or(CollateralError::SampleOutOfRange {
                sample,
                samples: row.len(),
            })
    };

    if date >= grid[grid.len() - 1] {
        return at(grid.len() - 1);
    }
    if date == t0 {
        return Ok(value_t0);
    }
    // Exact grid dates hit Ok; everything else takes the next knot, which
    // also gives flat backward extrapolation before the first grid date.
    match grid.binary_search(&date) {
        Ok(i) => at(i),
        Err(i) => at(i),
    }
}

/// Accrues the account to `date` and posts any margin call due there.
///
/// A positive requirement (we receive) is only postable on a date eligible
/// for our call schedule and settles immediately under `AsymmetricDVA`; a
/// negative requirement is only postable on a counterparty post date and
/// settles immediately under `AsymmetricCVA`. Under `NoLag` both sides
/// settle immediately; otherwise settlement lags by the margin period of
/// risk.
pub fn update_margin_call(
    account: &mut CollateralAccount,
    uncollat_value: f64,
    date: Date,
    annualised_rate: f64,
    eligible_call: bool,
    eligible_post: bool,
) {
    account.update_balance(date, annualised_rate);

    let margin = margin_requirement(account, uncollat_value, date);
    if margin == 0.0 {
        return;
    }

    let calc_type = account.agreement().calculation_type();
    let lag = if calc_type == CalculationType::NoLag {
        0
    } else {
        account.agreement().margin_period_of_risk()
    };

    if margin > 0.0 && eligible_call {
        let settlement = if calc_type == CalculationType::AsymmetricDva {
            date
        } else {
            date + lag
        };
        account.post_margin_call(margin, settlement, date);
    } else if margin < 0.0 && eligible_post {
        let settlement = if calc_type == CalculationType::AsymmetricCva {
            date
        } else {
            date + lag
        };
        account.post_margin_call(margin, settlement, date);
    }
}

/// Inputs of [`collateral_balance_paths`].
///
/// All profiles are indexed `[date_idx][sample]` on `date_grid` and must
/// share one scenario dimension. FX rates convert the netting-set value
/// into the collateral currency; collateral rates are annualised accrual
/// rates of the collateral account.
pub struct CollateralPathInputs<'a> {
    /// CSA terms of the netting set.
    pub agreement: Arc<CollateralAgreement>,
    /// Netting-set value at `t0` (in netting-set currency).
    pub netting_set_value_t0: f64,
    /// Time zero of the simulation.
    pub t0: Date,
    /// Simulated netting-set values.
    pub netting_set_values: &'a [Vec<f64>],
    /// Final maturity of the netting set.
    pub netting_set_maturity: Date,
    /// Simulation date grid.
    pub date_grid: &'a [Date],
    /// FX rate (collateral currency per netting-set currency) at `t0`.
    pub fx_rate_t0: f64,
    /// Simulated FX rates.
    pub fx_rates: &'a [Vec<f64>],
    /// Annualised collateral accrual rate at `t0`.
    pub collateral_rate_t0: f64,
    /// Simulated collateral accrual rates.
    pub collateral_rates: &'a [Vec<f64>],
    /// Variation margin balance already held at `t0`.
    pub initial_balance: f64,
}

/// Generates one collateral account path per scenario.
///
/// Per scenario: a base account is seeded with the time-zero margin
/// requirement, then the clock is stepped through the merged call/post
/// margin schedules until `simulation_end = min(netting-set maturity, last
/// grid date) + margin period of risk`, estimating the netting-set value,
/// FX rate and collateral rate at every visited date, accruing the account
/// and posting eligibility-gated margin calls. Each account is closed (zero
/// balance) one day after `simulation_end`.
///
/// Scenario paths are generated in parallel; each path owns its account.
///
/// # Errors
///
/// Profile shape mismatches are rejected up front. A violation of the
/// two-cursor stepping invariant or a loop terminating before
/// `simulation_end` is an internal-consistency error and aborts the whole
/// generation; estimation errors propagate unchanged.
pub fn collateral_balance_paths(
    inputs: &CollateralPathInputs<'_>,
) -> Result<Vec<CollateralAccount>, CollateralError> {
    let grid = inputs.date_grid;
    if inputs.netting_set_values.is_empty() {
        return Err(CollateralError::EmptyProfile("netting set value"));
    }
    for (field, profile) in [
        ("netting set value", inputs.netting_set_values),
        ("fx rate", inputs.fx_rates),
        ("collateral rate", inputs.collateral_rates),
    ] {
        if profile.len() != grid.len() {
            return Err(CollateralError::ProfileShape {
                field,
                expected: grid.len(),
                actual: profile.len(),
            });
        }
    }
    let num_scenarios = inputs.netting_set_values[0].len();
    for (field, profile) in [
        ("fx rate", inputs.fx_rates),
        ("collateral rate", inputs.collateral_rates),
    ] {
        if profile[0].len() != num_scenarios {
            return Err(CollateralError::ScenarioCountMismatch {
                field,
                expected: num_scenarios,
                actual: profile[0].len(),
            });
        }
    }

    // Time-zero margin requirement against any initial variation margin
    // seeds the base account for every scenario.
    let t0_account =
        CollateralAccount::new(inputs.agreement.clone(), inputs.initial_balance, inputs.t0);
    let balance_t0 = margin_requirement(&t0_account, inputs.netting_set_value_t0, inputs.t0);
    let base = CollateralAccount::new(inputs.agreement.clone(), balance_t0, inputs.t0);

    let last_grid_date = grid[grid.len() - 1];
    let simulation_end = inputs.netting_set_maturity.min(last_grid_date)
        + inputs.agreement.margin_period_of_risk();

    debug!(
        scenarios = num_scenarios,
        %simulation_end,
        balance_t0,
        "generating collateral balance paths"
    );

    (0..num_scenarios)
        .into_par_iter()
        .map(|sample| {
            let mut account = base.clone();
            let mut current = inputs.t0;
            let mut next_call = inputs.t0;
            let mut next_post = inputs.t0;

            while current <= simulation_end {
                if current > next_call
                    || current > next_post
                    || (current != next_call && current != next_post)
                {
                    return Err(CollateralError::TimeStepping {
                        current,
                        next_call,
                        next_post,
                    });
                }
                let eligible_call = current == next_call;
                let eligible_post = current == next_post;

                let uncollat = estimate_exposure_at(
                    current,
                    inputs.netting_set_value_t0,
                    inputs.t0,
                    inputs.netting_set_values,
                    sample,
                    grid,
                )?;
                let fx = estimate_exposure_at(
                    current,
                    inputs.fx_rate_t0,
                    inputs.t0,
                    inputs.fx_rates,
                    sample,
                    grid,
                )?;
                let rate = estimate_exposure_at(
                    current,
                    inputs.collateral_rate_t0,
                    inputs.t0,
                    inputs.collateral_rates,
                    sample,
                    grid,
                )?;
                if fx <= 0.0 {
                    return Err(CollateralError::NonPositiveFxRate {
                        date: current,
                        value: fx,
                    });
                }

                update_margin_call(
                    &mut account,
                    uncollat / fx,
                    current,
                    rate,
                    eligible_call,
                    eligible_post,
                );

                if eligible_call {
                    next_call = current + inputs.agreement.margin_call_frequency();
                }
                if eligible_post {
                    next_post = current + inputs.agreement.margin_post_frequency();
                }
                current = next_call.min(next_post);
            }

            if current <= simulation_end {
                return Err(CollateralError::PathTermination {
                    reached: current,
                    sim_end: simulation_end,
                });
            }

            account.close(simulation_end + 1);
            Ok(account)
        })
        .collect()
}
