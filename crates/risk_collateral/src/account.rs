//! Collateral account: the per-scenario margining state machine.
//!
//! One account exists per (netting set, scenario). It is created by cloning
//! a base account at the start of each scenario path, mutated step by step
//! as the path is walked, and closed one day after the simulation horizon.
//! Accounts are never shared across scenarios.

use std::sync::Arc;

use tracing::trace;

use risk_core::types::{Date, DayCountConvention};

use crate::agreement::CollateralAgreement;

/// A margin call that has been posted but not yet settled.
#[derive(Clone, Debug, PartialEq)]
struct MarginCall {
    amount: f64,
    settlement_date: Date,
    request_date: Date,
}

/// Collateral balance state along one scenario path.
///
/// Tracks the current balance, the outstanding (posted-but-unsettled)
/// margin calls keyed by settlement date, and the balance event history
/// used to read the balance back at arbitrary dates.
///
/// Positive balance: collateral we hold. Negative: collateral we posted.
#[derive(Clone, Debug)]
pub struct CollateralAccount {
    agreement: Arc<CollateralAgreement>,
    open_date: Date,
    balance: f64,
    balance_date: Date,
    outstanding: Vec<MarginCall>,
    history: Vec<(Date, f64)>,
    close_date: Option<Date>,
}

impl CollateralAccount {
    /// Opens an account under `agreement` with an initial balance at
    /// `open_date`.
    pub fn new(agreement: Arc<CollateralAgreement>, initial_balance: f64, open_date: Date) -> Self {
        Self {
            agreement,
            open_date,
            balance: initial_balance,
            balance_date: open_date,
            outstanding: Vec::new(),
            history: vec![(open_date, initial_balance)],
            close_date: None,
        }
    }

    /// Returns the governing agreement.
    #[inline]
    pub fn agreement(&self) -> &CollateralAgreement {
        &self.agreement
    }

    /// Returns the current balance.
    #[inline]
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Returns the date the account was opened.
    #[inline]
    pub fn open_date(&self) -> Date {
        self.open_date
    }

    /// Returns the date the account was closed, if it has been.
    #[inline]
    pub fn close_date(&self) -> Option<Date> {
        self.close_date
    }

    /// Sum of margin calls that settle strictly after `as_of`.
    ///
    /// These amounts have been requested but not yet delivered, so they
    /// reduce the shortfall of any further margin requirement at `as_of`.
    pub fn outstanding_margin_amount(&self, as_of: Date) -> f64 {
        self.outstanding
            .iter()
            .filter(|c| c.settlement_date > as_of)
            .map(|c| c.amount)
            .sum()
    }

    /// Settles all margin calls due on or before `date` and accrues simple
    /// interest (ACT/365F) on the balance at the annualised collateral rate
    /// between balance events.
    ///
    /// Records a balance event at every settlement and at `date` itself, so
    /// [`balance_as_of`](Self::balance_as_of) can read the path back.
    pub fn update_balance(&mut self, date: Date, annualised_rate: f64) {
        // Settlement dates are kept sorted, so due calls form a prefix.
        let due = self
            .outstanding
            .partition_point(|c| c.settlement_date <= date);
        let settled: Vec<MarginCall> = self.outstanding.drain(..due).collect();
        for call in settled {
            let settle = call.settlement_date.max(self.balance_date);
            self.accrue_to(settle, annualised_rate);
            self.balance += call.amount;
            trace!(
                amount = call.amount,
                requested = %call.request_date,
                settled = %settle,
                "settling margin call"
            );
            self.record(settle);
        }
        self.accrue_to(date, annualised_rate);
        self.record(date);
    }

    /// Registers a margin call for settlement on `settlement_date`.
    ///
    /// `amount` is signed: positive means we receive collateral.
    pub fn post_margin_call(&mut self, amount: f64, settlement_date: Date, request_date: Date) {
        let position = self
            .outstanding
            .partition_point(|c| c.settlement_date <= settlement_date);
        self.outstanding.insert(
            position,
            MarginCall {
                amount,
                settlement_date,
                request_date,
            },
        );
    }

    /// Closes the account at `date`: discards outstanding margin calls and
    /// forces the balance to zero.
    pub fn close(&mut self, date: Date) {
        self.outstanding.clear();
        self.balance = 0.0;
        self.balance_date = date;
        self.close_date = Some(date);
        self.record(date);
    }

    /// Reads the balance as of `date` from the event history: the balance
    /// at the latest event on or before `date`, or zero before the account
    /// was opened.
    pub fn balance_as_of(&self, date: Date) -> f64 {
        let position = self.history.partition_point(|(d, _)| *d <= date);
        if position == 0 {
            0.0
        } else {
            self.history[position - 1].1
        }
    }

    fn accrue_to(&mut self, date: Date, annualised_rate: f64) {
        if date > self.balance_date {
            let yf = DayCountConvention::Act365Fixed.year_fraction(self.balance_date, date);
            self.balance *= 1.0 + annualised_rate * yf;
            self.balance_date = date;
        }
    }

    fn record(&mut self, date: Date) {
        match self.history.last_mut() {
            Some((last, value)) if *last == date => *value = self.balance,
            _ => self.history.push((date, self.balance)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn d(y: i32, m: u32, day: u32) -> Date {
        Date::from_ymd(y, m, day).unwrap()
    }

    fn agreement() -> Arc<CollateralAgreement> {
        Arc::new(CollateralAgreement::builder().build().unwrap())
    }

    #[test]
    fn test_new_account() {
        let acc = CollateralAccount::new(agreement(), 100.0, d(2024, 1, 1));
        assert_eq!(acc.balance(), 100.0);
        assert_eq!(acc.open_date(), d(2024, 1, 1));
        assert_eq!(acc.close_date(), None);
        assert_eq!(acc.outstanding_margin_amount(d(2024, 1, 1)), 0.0);
    }

    #[test]
    fn test_accrual_without_margin_flows() {
        let mut acc = CollateralAccount::new(agreement(), 100.0, d(2024, 1, 1));
        acc.update_balance(d(2025, 1, 1), 0.05);
        // 366 days in 2024 under ACT/365F.
        assert_relative_eq!(acc.balance(), 100.0 * (1.0 + 0.05 * 366.0 / 365.0), epsilon = 1e-10);
    }

    #[test]
    fn test_settlement_with_interim_accrual() {
        let mut acc = CollateralAccount::new(agreement(), 100.0, d(2024, 1, 1));
        acc.post_margin_call(50.0, d(2024, 7, 1), d(2024, 6, 29));

        // Before settlement the call is outstanding.
        assert_eq!(acc.outstanding_margin_amount(d(2024, 6, 30)), 50.0);

        acc.update_balance(d(2025, 1, 1), 0.05);
        let to_settle = (d(2024, 7, 1) - d(2024, 1, 1)) as f64 / 365.0;
        let after_settle = (d(2025, 1, 1) - d(2024, 7, 1)) as f64 / 365.0;
        let expected = (100.0 * (1.0 + 0.05 * to_settle) + 50.0) * (1.0 + 0.05 * after_settle);
        assert_relative_eq!(acc.balance(), expected, epsilon = 1e-10);
        assert_eq!(acc.outstanding_margin_amount(d(2025, 1, 1)), 0.0);
    }

    #[test]
    fn test_settlement_order_preserved() {
        let mut acc = CollateralAccount::new(agreement(), 0.0, d(2024, 1, 1));
        acc.post_margin_call(30.0, d(2024, 3, 1), d(2024, 2, 28));
        acc.post_margin_call(-10.0, d(2024, 2, 1), d(2024, 1, 30));

        acc.update_balance(d(2024, 2, 15), 0.0);
        assert_relative_eq!(acc.balance(), -10.0, epsilon = 1e-12);
        assert_eq!(acc.outstanding_margin_amount(d(2024, 2, 15)), 30.0);

        acc.update_balance(d(2024, 3, 15), 0.0);
        assert_relative_eq!(acc.balance(), 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_close_forces_zero_balance() {
        let mut acc = CollateralAccount::new(agreement(), 75.0, d(2024, 1, 1));
        acc.post_margin_call(25.0, d(2024, 6, 1), d(2024, 5, 30));
        acc.close(d(2024, 4, 1));

        assert_eq!(acc.balance(), 0.0);
        assert_eq!(acc.close_date(), Some(d(2024, 4, 1)));
        assert_eq!(acc.outstanding_margin_amount(d(2024, 1, 1)), 0.0);
    }

    #[test]
    fn test_balance_as_of_reads_history() {
        let mut acc = CollateralAccount::new(agreement(), 100.0, d(2024, 1, 1));
        acc.post_margin_call(50.0, d(2024, 7, 1), d(2024, 6, 29));
        acc.update_balance(d(2024, 12, 1), 0.0);
        acc.close(d(2024, 12, 2));

        // Before the account existed.
        assert_eq!(acc.balance_as_of(d(2023, 12, 31)), 0.0);
        // Between open and settlement.
        assert_eq!(acc.balance_as_of(d(2024, 3, 1)), 100.0);
        // After settlement.
        assert_eq!(acc.balance_as_of(d(2024, 7, 1)), 150.0);
        assert_eq!(acc.balance_as_of(d(2024, 11, 30)), 150.0);
        // After close.
        assert_eq!(acc.balance_as_of(d(2024, 12, 2)), 0.0);
        assert_eq!(acc.balance_as_of(d(2025, 6, 1)), 0.0);
    }

    #[test]
    fn test_clone_is_independent() {
        let base = CollateralAccount::new(agreement(), 10.0, d(2024, 1, 1));
        let mut path = base.clone();
        path.post_margin_call(5.0, d(2024, 2, 1), d(2024, 1, 31));
        path.update_balance(d(2024, 3, 1), 0.0);

        assert_eq!(base.balance(), 10.0);
        assert_eq!(base.outstanding_margin_amount(d(2024, 1, 1)), 0.0);
        assert_relative_eq!(path.balance(), 15.0, epsilon = 1e-12);
    }
}
