//! xVA aggregation error types.
//!
//! Everything here is a configuration error: cube axes that disagree,
//! slots beyond a cube's depth, ids or dates absent from an axis. The
//! calculators fail loudly instead of defaulting.

use thiserror::Error;

use risk_core::types::{CubeError, Date};

/// Errors raised by the xVA calculators and exposure aggregators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum XvaError {
    /// Two cubes that must share a date axis have different date counts.
    #[error("{left} cube has {left_count} dates, {right} cube has {right_count}")]
    DateCountMismatch {
        /// Name of the first cube
        left: &'static str,
        /// Name of the second cube
        right: &'static str,
        /// Date count of the first cube
        left_count: usize,
        /// Date count of the second cube
        right_count: usize,
    },

    /// Two cubes that must share a date axis disagree on a date value.
    #[error("{left} and {right} cubes disagree at date index {index}: {left_date} vs {right_date}")]
    DateValueMismatch {
        /// Name of the first cube
        left: &'static str,
        /// Name of the second cube
        right: &'static str,
        /// Index of the first disagreement
        index: usize,
        /// Date of the first cube at that index
        left_date: Date,
        /// Date of the second cube at that index
        right_date: Date,
    },

    /// Two cubes that must share a sample dimension disagree.
    #[error("{left} cube has {left_count} samples, {right} cube has {right_count}")]
    SampleCountMismatch {
        /// Name of the first cube
        left: &'static str,
        /// Name of the second cube
        right: &'static str,
        /// Sample count of the first cube
        left_count: usize,
        /// Sample count of the second cube
        right_count: usize,
    },

    /// A metric slot beyond a cube's depth.
    #[error("{cube} cube slot {slot} exceeds depth {depth}")]
    SlotOutOfRange {
        /// Name of the cube
        cube: &'static str,
        /// Requested slot
        slot: usize,
        /// Cube depth
        depth: usize,
    },

    /// An MVA operation was requested without an initial-margin cube.
    #[error("no posted-initial-margin cube supplied for MVA calculation")]
    MissingInitialMarginCube,

    /// A per-interval day-count fraction list of the wrong length.
    #[error("expected {expected} day count fractions (one per grid date), got {actual}")]
    DayCountLength {
        /// Number of grid dates
        expected: usize,
        /// Supplied list length
        actual: usize,
    },

    /// The trade → netting-set membership list does not match the cube.
    #[error("trade cube has {cube} entities but {memberships} netting-set memberships supplied")]
    MembershipLength {
        /// Entity count of the trade cube
        cube: usize,
        /// Supplied membership count
        memberships: usize,
    },

    /// A collateral path set with the wrong number of scenarios.
    #[error("netting set '{netting_set}' has {actual} collateral paths, cube has {expected} samples")]
    CollateralPathCount {
        /// Netting set whose paths are malformed
        netting_set: String,
        /// Sample count of the cube
        expected: usize,
        /// Number of collateral accounts supplied
        actual: usize,
    },

    /// An unrecognised allocation method name.
    #[error("allocation method '{0}' not recognised")]
    UnknownAllocationMethod(String),

    /// An id or date lookup failed on a cube axis.
    #[error(transparent)]
    Cube(#[from] CubeError),
}
