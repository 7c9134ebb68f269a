//! Dense exposure cube: the shared store of the simulation pipeline.
//!
//! The [`ExposureCube`] is a 4-axis array over (entity, date, sample,
//! metric slot) plus a separate T0 slice per (entity, slot). Entities are
//! trades, netting sets, or counterparties depending on which cube of the
//! pipeline is at hand; the type is the same for all three.
//!
//! # Write discipline
//!
//! The cube is allocated once before the simulation loop, filled
//! incrementally during it, and read-only afterwards. Each cell is written
//! at most once per run; the allocation pass over the allocated-EPE/ENE
//! slots is the one sanctioned overwrite. The type does not police this
//! contract — it is part of the pipeline design.
//!
//! # Examples
//!
//! ```
//! use risk_core::cube::{ExposureCube, ExposureMetric, EXPOSURE_DEPTH};
//! use risk_core::types::Date;
//!
//! let dates = vec![
//!     Date::from_ymd(2024, 7, 1).unwrap(),
//!     Date::from_ymd(2025, 1, 1).unwrap(),
//! ];
//! let mut cube = ExposureCube::new(
//!     vec!["T001".to_string()],
//!     dates,
//!     100,
//!     EXPOSURE_DEPTH,
//! ).unwrap();
//!
//! cube.set(125.0, 0, 1, 42, ExposureMetric::Epe.slot());
//! assert_eq!(cube.get(0, 1, 42, ExposureMetric::Epe.slot()), 125.0);
//! ```

use std::collections::HashMap;

use crate::types::{CubeError, Date};

/// Number of metric slots in a standard exposure cube
/// (EPE, ENE, allocated EPE, allocated ENE).
pub const EXPOSURE_DEPTH: usize = 4;

/// Metric slot of a single-slot survival-probability cube.
pub const SURVIVAL_SLOT: usize = 0;

/// Metric slots of a standard exposure cube.
///
/// The slot set is closed: calculators and aggregators address cube depth
/// through these variants (or [`SURVIVAL_SLOT`] for survival cubes) rather
/// than through ad-hoc integers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExposureMetric {
    /// Positive part of the simulated value.
    Epe,
    /// Negative part (magnitude) of the simulated value.
    Ene,
    /// Netting-set EPE allocated back to the trade.
    AllocatedEpe,
    /// Netting-set ENE allocated back to the trade.
    AllocatedEne,
}

impl ExposureMetric {
    /// Returns the cube slot index of this metric.
    #[inline]
    pub const fn slot(self) -> usize {
        match self {
            ExposureMetric::Epe => 0,
            ExposureMetric::Ene => 1,
            ExposureMetric::AllocatedEpe => 2,
            ExposureMetric::AllocatedEne => 3,
        }
    }
}

/// Dense 4-axis store of simulated values.
///
/// Axes: entity id (unique, stable ordering), date (strictly increasing,
/// shared across entities), sample (0..samples), metric slot (0..depth).
/// Values default to zero. Storage is a flat `Vec<f64>` in entity-major
/// order, so one entity's profile is contiguous.
#[derive(Clone, Debug)]
pub struct ExposureCube {
    ids: Vec<String>,
    id_index: HashMap<String, usize>,
    dates: Vec<Date>,
    samples: usize,
    depth: usize,
    t0: Vec<f64>,
    data: Vec<f64>,
}

impl ExposureCube {
    /// Allocates a zero-filled cube with the given axes.
    ///
    /// # Arguments
    ///
    /// * `ids` - Entity ids (must be unique and non-empty)
    /// * `dates` - Date axis (must be strictly increasing and non-empty)
    /// * `samples` - Number of Monte Carlo samples (must be non-zero)
    /// * `depth` - Number of metric slots (must be non-zero)
    ///
    /// # Errors
    ///
    /// Returns a `CubeError` for empty axes, duplicate ids, or an
    /// out-of-order date axis. These are configuration errors: the cube
    /// must be valid before any simulation starts.
    pub fn new(
        ids: Vec<String>,
        dates: Vec<Date>,
        samples: usize,
        depth: usize,
    ) -> Result<Self, CubeError> {
        if ids.is_empty() {
            return Err(CubeError::EmptyAxis("entity"));
        }
        if dates.is_empty() {
            return Err(CubeError::EmptyAxis("date"));
        }
        if samples == 0 {
            return Err(CubeError::EmptyAxis("sample"));
        }
        if depth == 0 {
            return Err(CubeError::EmptyAxis("metric slot"));
        }

        let mut id_index = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if id_index.insert(id.clone(), i).is_some() {
                return Err(CubeError::DuplicateId(id.clone()));
            }
        }

        for (i, pair) in dates.windows(2).enumerate() {
            if pair[0] >= pair[1] {
                return Err(CubeError::UnorderedDates { position: i + 1 });
            }
        }

        let t0 = vec![0.0; ids.len() * depth];
        let data = vec![0.0; ids.len() * dates.len() * samples * depth];

        Ok(Self {
            ids,
            id_index,
            dates,
            samples,
            depth,
            t0,
            data,
        })
    }

    /// Returns the number of entities on the entity axis.
    #[inline]
    pub fn num_ids(&self) -> usize {
        self.ids.len()
    }

    /// Returns the number of dates on the date axis.
    #[inline]
    pub fn num_dates(&self) -> usize {
        self.dates.len()
    }

    /// Returns the number of samples.
    #[inline]
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Returns the number of metric slots.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the entity ids in axis order.
    #[inline]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Returns the date axis.
    #[inline]
    pub fn dates(&self) -> &[Date] {
        &self.dates
    }

    /// Resolves an entity id to its axis position.
    ///
    /// # Errors
    ///
    /// Returns `CubeError::UnknownId` if the id is absent. Consumers treat
    /// this as a fatal configuration error.
    pub fn index_of_id(&self, id: &str) -> Result<usize, CubeError> {
        self.id_index
            .get(id)
            .copied()
            .ok_or_else(|| CubeError::UnknownId(id.to_string()))
    }

    /// Resolves a date to its axis position.
    ///
    /// # Errors
    ///
    /// Returns `CubeError::UnknownDate` if the date is not on the axis.
    pub fn index_of_date(&self, date: Date) -> Result<usize, CubeError> {
        self.dates
            .binary_search(&date)
            .map_err(|_| CubeError::UnknownDate(date))
    }

    #[inline]
    fn offset(&self, id_idx: usize, date_idx: usize, sample: usize, slot: usize) -> usize {
        ((id_idx * self.dates.len() + date_idx) * self.samples + sample) * self.depth + slot
    }

    /// Reads the value at (entity, date, sample, slot).
    ///
    /// # Panics
    ///
    /// Panics if any index is out of range. Hot-path accessor: indices are
    /// produced by the loop bounds of the simulation, not by user input.
    #[inline]
    pub fn get(&self, id_idx: usize, date_idx: usize, sample: usize, slot: usize) -> f64 {
        self.data[self.offset(id_idx, date_idx, sample, slot)]
    }

    /// Writes the value at (entity, date, sample, slot).
    ///
    /// # Panics
    ///
    /// Panics if any index is out of range.
    #[inline]
    pub fn set(&mut self, value: f64, id_idx: usize, date_idx: usize, sample: usize, slot: usize) {
        let offset = self.offset(id_idx, date_idx, sample, slot);
        self.data[offset] = value;
    }

    /// Reads the T0 value at (entity, slot).
    ///
    /// # Panics
    ///
    /// Panics if any index is out of range.
    #[inline]
    pub fn get_t0(&self, id_idx: usize, slot: usize) -> f64 {
        self.t0[id_idx * self.depth + slot]
    }

    /// Writes the T0 value at (entity, slot).
    ///
    /// # Panics
    ///
    /// Panics if any index is out of range.
    #[inline]
    pub fn set_t0(&mut self, value: f64, id_idx: usize, slot: usize) {
        self.t0[id_idx * self.depth + slot] = value;
    }

    /// Merges a sample-chunk cube into this cube at the given sample offset.
    ///
    /// The block must share the entity axis, date axis, and depth of this
    /// cube; its samples land at `[sample_offset, sample_offset + block
    /// samples)`. T0 values are not copied (they are sample-independent and
    /// owned by the caller). This is the merge step of the parallel cube
    /// builder: each worker fills a private block, and blocks cover
    /// disjoint sample ranges.
    ///
    /// # Errors
    ///
    /// Returns `CubeError::SampleBlockMismatch` if the axes disagree or the
    /// block does not fit at the offset.
    pub fn copy_sample_block(
        &mut self,
        block: &ExposureCube,
        sample_offset: usize,
    ) -> Result<(), CubeError> {
        if block.ids != self.ids {
            return Err(CubeError::SampleBlockMismatch(
                "entity axes differ".to_string(),
            ));
        }
        if block.dates != self.dates {
            return Err(CubeError::SampleBlockMismatch(
                "date axes differ".to_string(),
            ));
        }
        if block.depth != self.depth {
            return Err(CubeError::SampleBlockMismatch(format!(
                "depth {} differs from {}",
                block.depth, self.depth
            )));
        }
        if sample_offset + block.samples > self.samples {
            return Err(CubeError::SampleBlockMismatch(format!(
                "block of {} samples does not fit at offset {} (cube has {})",
                block.samples, sample_offset, self.samples
            )));
        }

        for id_idx in 0..self.ids.len() {
            for date_idx in 0..self.dates.len() {
                for s in 0..block.samples {
                    for slot in 0..self.depth {
                        let value = block.get(id_idx, date_idx, s, slot);
                        self.set(value, id_idx, date_idx, sample_offset + s, slot);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(specs: &[(i32, u32, u32)]) -> Vec<Date> {
        specs
            .iter()
            .map(|&(y, m, d)| Date::from_ymd(y, m, d).unwrap())
            .collect()
    }

    fn create_test_cube() -> ExposureCube {
        ExposureCube::new(
            vec!["T001".to_string(), "T002".to_string()],
            dates(&[(2024, 7, 1), (2025, 1, 1), (2025, 7, 1)]),
            4,
            EXPOSURE_DEPTH,
        )
        .unwrap()
    }

    #[test]
    fn test_cube_dimensions() {
        let cube = create_test_cube();
        assert_eq!(cube.num_ids(), 2);
        assert_eq!(cube.num_dates(), 3);
        assert_eq!(cube.samples(), 4);
        assert_eq!(cube.depth(), EXPOSURE_DEPTH);
    }

    #[test]
    fn test_cube_zero_initialised() {
        let cube = create_test_cube();
        assert_eq!(cube.get(1, 2, 3, ExposureMetric::Ene.slot()), 0.0);
        assert_eq!(cube.get_t0(0, 0), 0.0);
    }

    #[test]
    fn test_cube_get_set() {
        let mut cube = create_test_cube();
        cube.set(42.5, 1, 2, 3, ExposureMetric::Epe.slot());
        assert_eq!(cube.get(1, 2, 3, ExposureMetric::Epe.slot()), 42.5);
        // Neighbouring cells untouched
        assert_eq!(cube.get(1, 2, 3, ExposureMetric::Ene.slot()), 0.0);
        assert_eq!(cube.get(1, 2, 2, ExposureMetric::Epe.slot()), 0.0);
    }

    #[test]
    fn test_cube_t0() {
        let mut cube = create_test_cube();
        cube.set_t0(7.0, 0, ExposureMetric::Ene.slot());
        assert_eq!(cube.get_t0(0, ExposureMetric::Ene.slot()), 7.0);
    }

    #[test]
    fn test_cube_rejects_duplicate_ids() {
        let result = ExposureCube::new(
            vec!["T001".to_string(), "T001".to_string()],
            dates(&[(2024, 7, 1)]),
            1,
            1,
        );
        assert_eq!(result.unwrap_err(), CubeError::DuplicateId("T001".into()));
    }

    #[test]
    fn test_cube_rejects_unordered_dates() {
        let result = ExposureCube::new(
            vec!["T001".to_string()],
            dates(&[(2025, 1, 1), (2024, 7, 1)]),
            1,
            1,
        );
        assert_eq!(
            result.unwrap_err(),
            CubeError::UnorderedDates { position: 1 }
        );
    }

    #[test]
    fn test_cube_rejects_repeated_dates() {
        let result = ExposureCube::new(
            vec!["T001".to_string()],
            dates(&[(2024, 7, 1), (2024, 7, 1)]),
            1,
            1,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cube_rejects_empty_axes() {
        assert!(ExposureCube::new(vec![], dates(&[(2024, 7, 1)]), 1, 1).is_err());
        assert!(ExposureCube::new(vec!["T1".into()], vec![], 1, 1).is_err());
        assert!(ExposureCube::new(vec!["T1".into()], dates(&[(2024, 7, 1)]), 0, 1).is_err());
        assert!(ExposureCube::new(vec!["T1".into()], dates(&[(2024, 7, 1)]), 1, 0).is_err());
    }

    #[test]
    fn test_index_lookups() {
        let cube = create_test_cube();
        assert_eq!(cube.index_of_id("T002").unwrap(), 1);
        assert!(matches!(
            cube.index_of_id("T999"),
            Err(CubeError::UnknownId(_))
        ));

        let d = Date::from_ymd(2025, 1, 1).unwrap();
        assert_eq!(cube.index_of_date(d).unwrap(), 1);
        let absent = Date::from_ymd(2024, 12, 31).unwrap();
        assert!(matches!(
            cube.index_of_date(absent),
            Err(CubeError::UnknownDate(_))
        ));
    }

    #[test]
    fn test_copy_sample_block() {
        let mut full = create_test_cube();
        let mut block = ExposureCube::new(
            vec!["T001".to_string(), "T002".to_string()],
            dates(&[(2024, 7, 1), (2025, 1, 1), (2025, 7, 1)]),
            2,
            EXPOSURE_DEPTH,
        )
        .unwrap();
        block.set(11.0, 0, 1, 0, 0);
        block.set(22.0, 1, 2, 1, 1);

        full.copy_sample_block(&block, 2).unwrap();
        assert_eq!(full.get(0, 1, 2, 0), 11.0);
        assert_eq!(full.get(1, 2, 3, 1), 22.0);
        // Samples outside the block untouched
        assert_eq!(full.get(0, 1, 0, 0), 0.0);
    }

    #[test]
    fn test_copy_sample_block_mismatch() {
        let mut full = create_test_cube();
        let block = ExposureCube::new(
            vec!["T001".to_string()],
            dates(&[(2024, 7, 1), (2025, 1, 1), (2025, 7, 1)]),
            2,
            EXPOSURE_DEPTH,
        )
        .unwrap();
        assert!(full.copy_sample_block(&block, 0).is_err());

        let oversized = ExposureCube::new(
            vec!["T001".to_string(), "T002".to_string()],
            dates(&[(2024, 7, 1), (2025, 1, 1), (2025, 7, 1)]),
            3,
            EXPOSURE_DEPTH,
        )
        .unwrap();
        assert!(full.copy_sample_block(&oversized, 2).is_err());
    }

    #[test]
    fn test_metric_slots() {
        assert_eq!(ExposureMetric::Epe.slot(), 0);
        assert_eq!(ExposureMetric::Ene.slot(), 1);
        assert_eq!(ExposureMetric::AllocatedEpe.slot(), 2);
        assert_eq!(ExposureMetric::AllocatedEne.slot(), 3);
    }
}
