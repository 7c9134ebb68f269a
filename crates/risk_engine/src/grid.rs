//! Simulation date grid.

use risk_core::types::Date;

use crate::error::EngineError;

/// Ordered sequence of simulation dates, shared by every entity of a run.
///
/// The grid is validated on construction: non-empty and strictly
/// increasing. All cubes of a run share one grid.
///
/// # Examples
///
/// ```
/// use risk_core::types::Date;
/// use risk_engine::grid::DateGrid;
///
/// let grid = DateGrid::new(vec![
///     Date::from_ymd(2024, 7, 1).unwrap(),
///     Date::from_ymd(2025, 1, 1).unwrap(),
/// ]).unwrap();
///
/// assert_eq!(grid.len(), 2);
/// assert_eq!(grid.last(), Date::from_ymd(2025, 1, 1).unwrap());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DateGrid {
    dates: Vec<Date>,
}

impl DateGrid {
    /// Creates a date grid from an ordered list of simulation dates.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidDateGrid` if the list is empty or not
    /// strictly increasing.
    pub fn new(dates: Vec<Date>) -> Result<Self, EngineError> {
        if dates.is_empty() {
            return Err(EngineError::InvalidDateGrid(
                "grid must contain at least one date".to_string(),
            ));
        }
        for (i, pair) in dates.windows(2).enumerate() {
            if pair[0] >= pair[1] {
                return Err(EngineError::InvalidDateGrid(format!(
                    "dates must be strictly increasing, violated at position {} ({} >= {})",
                    i + 1,
                    pair[0],
                    pair[1]
                )));
            }
        }
        Ok(Self { dates })
    }

    /// Returns the simulation dates in order.
    #[inline]
    pub fn dates(&self) -> &[Date] {
        &self.dates
    }

    /// Returns the number of simulation dates.
    #[inline]
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Always false: an empty grid cannot be constructed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Returns the first simulation date.
    #[inline]
    pub fn first(&self) -> Date {
        self.dates[0]
    }

    /// Returns the last simulation date (the simulation horizon).
    #[inline]
    pub fn last(&self) -> Date {
        self.dates[self.dates.len() - 1]
    }
}
