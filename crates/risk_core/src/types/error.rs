//! Error types for the foundation layer.
//!
//! This module provides:
//! - `DateError`: Errors from date construction and parsing
//! - `CurrencyError`: Errors from currency parsing
//! - `CubeError`: Errors from exposure cube construction and lookups
//!
//! All of these represent configuration errors in the sense of the risk
//! pipeline: they are fatal and are never silently converted into default
//! values by the consuming layers.

use thiserror::Error;

use super::time::Date;

/// Date-related errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    /// Invalid date components (e.g., February 30th).
    #[error("invalid date: {year}-{month}-{day}")]
    InvalidDate {
        /// Year component
        year: i32,
        /// Month component (1-12)
        month: u32,
        /// Day component (1-31)
        day: u32,
    },

    /// Failed to parse a date or convention string.
    #[error("date parse error: {0}")]
    ParseError(String),
}

/// Currency-related errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyError {
    /// Unknown currency code.
    #[error("unknown currency: {0}")]
    UnknownCurrency(String),
}

/// Exposure cube construction and lookup errors.
///
/// Lookups by id or date fail loudly: an absent id or date is a
/// configuration error in the calling layer, not a recoverable condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CubeError {
    /// An axis of the cube has zero length.
    #[error("cube {0} axis must be non-empty")]
    EmptyAxis(&'static str),

    /// Duplicate entity id on the entity axis.
    #[error("duplicate entity id on cube axis: '{0}'")]
    DuplicateId(String),

    /// The date axis is not strictly increasing.
    #[error("cube date axis must be strictly increasing at position {position}")]
    UnorderedDates {
        /// Index of the first out-of-order date
        position: usize,
    },

    /// An entity id is absent from the entity axis.
    #[error("unknown entity id: '{0}'")]
    UnknownId(String),

    /// A date is absent from the date axis.
    #[error("date {0} not found on cube date axis")]
    UnknownDate(Date),

    /// A sample block could not be merged because the axes disagree.
    #[error("sample block mismatch: {0}")]
    SampleBlockMismatch(String),
}
