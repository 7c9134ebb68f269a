//! Collateral error types.
//!
//! Configuration errors (bad agreements, profile shape mismatches) and
//! internal-consistency errors (time-stepping invariant violations, early
//! path termination) are fatal: path generation aborts rather than
//! returning a silently inconsistent set of accounts.

use thiserror::Error;

use risk_core::types::Date;

/// Errors raised by collateral path generation and its helpers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollateralError {
    /// Invalid CSA terms supplied to the agreement builder.
    #[error("invalid collateral agreement: {0}")]
    InvalidAgreement(String),

    /// An exposure/FX/rate profile is empty.
    #[error("{0} profile is empty")]
    EmptyProfile(&'static str),

    /// A profile's date dimension does not match the date grid.
    #[error("{field} profile has {actual} date rows, date grid has {expected}")]
    ProfileShape {
        /// Which profile is malformed
        field: &'static str,
        /// Expected number of rows (grid length)
        expected: usize,
        /// Actual number of rows
        actual: usize,
    },

    /// A profile's scenario dimension disagrees with the netting-set values.
    #[error("{field} profile has {actual} scenarios, netting set values have {expected}")]
    ScenarioCountMismatch {
        /// Which profile is malformed
        field: &'static str,
        /// Scenario count of the netting-set value profile
        expected: usize,
        /// Scenario count of the offending profile
        actual: usize,
    },

    /// A sample index beyond the profile's scenario dimension.
    #[error("sample {sample} out of range for profile with {samples} scenarios")]
    SampleOutOfRange {
        /// Requested sample index
        sample: usize,
        /// Available scenario count
        samples: usize,
    },

    /// A collateral evaluation date before the start date.
    #[error("evaluation date {date} precedes start date {t0}")]
    DateBeforeStart {
        /// Requested evaluation date
        date: Date,
        /// Start date of the profile
        t0: Date,
    },

    /// The exposure grid starts before the start date.
    #[error("date grid starts at {first}, before start date {t0}")]
    GridPrecedesStart {
        /// First grid date
        first: Date,
        /// Start date of the profile
        t0: Date,
    },

    /// A non-positive FX rate on a collateral evaluation date.
    #[error("non-positive FX rate {value} at {date}")]
    NonPositiveFxRate {
        /// Evaluation date
        date: Date,
        /// Offending FX rate
        value: f64,
    },

    /// The two-cursor stepping scheme desynchronised: the current date
    /// matches neither margin schedule cursor.
    #[error(
        "collateral path time stepping invariant violated: current {current}, \
         next call {next_call}, next post {next_post}"
    )]
    TimeStepping {
        /// Date the loop is positioned at
        current: Date,
        /// Next due date of our margin-call schedule
        next_call: Date,
        /// Next due date of the counterparty's margin-post schedule
        next_post: Date,
    },

    /// The stepping loop terminated before reaching the simulation end.
    #[error("collateral path terminated at {reached}, before simulation end {sim_end}")]
    PathTermination {
        /// Last date the loop reached
        reached: Date,
        /// Required simulation end date
        sim_end: Date,
    },
}
