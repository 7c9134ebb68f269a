//! Per-sample index fixing buffer.
//!
//! Historical fixing state is not global: each sample owns a private
//! [`FixingBuffer`], seeded from the historical snapshot and extended with
//! fixings synthesised during that sample's date loop. The buffer is
//! dropped when the sample completes, so synthesised fixings can never leak
//! into another sample — isolation is a matter of ownership, not of
//! save/restore bookkeeping.

use std::collections::{BTreeMap, HashMap};

use risk_core::types::Date;

/// Map of (index name, fixing date) to fixing value.
///
/// # Examples
///
/// ```
/// use risk_core::types::Date;
/// use risk_engine::fixings::FixingBuffer;
///
/// let mut buffer = FixingBuffer::new();
/// let d = Date::from_ymd(2024, 6, 14).unwrap();
///
/// buffer.insert("EUR-EURIBOR-6M", d, 0.032);
/// assert_eq!(buffer.get("EUR-EURIBOR-6M", d), Some(0.032));
/// assert_eq!(buffer.get("EUR-EURIBOR-6M", d + 1), None);
/// ```
#[derive(Clone, Debug, Default)]
pub struct FixingBuffer {
    fixings: HashMap<String, BTreeMap<Date, f64>>,
}

impl FixingBuffer {
    /// Creates an empty fixing buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fixing for `index` on `date`, overwriting any existing
    /// value for that (index, date).
    pub fn insert(&mut self, index: impl Into<String>, date: Date, value: f64) {
        self.fixings
            .entry(index.into())
            .or_default()
            .insert(date, value);
    }

    /// Returns the fixing of `index` on `date`, if present.
    pub fn get(&self, index: &str, date: Date) -> Option<f64> {
        self.fixings.get(index).and_then(|m| m.get(&date)).copied()
    }

    /// Returns whether a fixing is present for `index` on `date`.
    pub fn contains(&self, index: &str, date: Date) -> bool {
        self.get(index, date).is_some()
    }

    /// Returns the total number of recorded fixings across all indices.
    pub fn len(&self) -> usize {
        self.fixings.values().map(|m| m.len()).sum()
    }

    /// Returns whether the buffer holds no fixings.
    pub fn is_empty(&self) -> bool {
        self.fixings.is_empty() || self.len() == 0
    }
}
