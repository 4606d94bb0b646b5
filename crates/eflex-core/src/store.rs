//! Versioned blackboard for iteration state.
//!
//! The [`IterationStore`] owns one [`IterationRecord`] per iteration index,
//! allocated up front by [`IterationStore::init`] and sealed once every block
//! has written its slice. Records are an append-only arena: iteration `k`
//! lives at index `k` and is never reallocated, so slices handed out for a
//! sealed iteration stay valid for the whole run.
//!
//! Write discipline: each block is the sole writer of its own
//! (iteration, unit, block) triple, so writes never race. A read of a slice
//! that was never written falls back to a zero-filled default; the caller is
//! expected to log that as a recoverable-data warning, for which the
//! `*_or_default` accessors emit a `tracing::warn!` themselves.

use thiserror::Error;
use tracing::warn;

use crate::entities::{UnitId, NUM_MODES};

/// Number of slack variables per unit-period.
pub const NUM_SLACKS: usize = 2;

/// Number of dual prices per unit-period: two coupling residuals, a one-hot
/// drift term, and a damped ramp residual.
pub const NUM_PRICES: usize = 4;

/// Iteration-store precondition failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A slice was accessed or written for an iteration that was never
    /// initialized.
    #[error("iteration {iteration} was not initialized")]
    UnknownIteration { iteration: usize },

    /// `init` was called out of order; the iteration counter is monotone.
    #[error("iteration {iteration} initialized out of order, expected {expected}")]
    OutOfOrderInit { iteration: usize, expected: usize },

    /// Unit index out of range for this run.
    #[error("unit index {unit} out of range (run has {num_units} units)")]
    InvalidIndex { unit: usize, num_units: usize },

    /// A written slice did not match the period count of the run.
    #[error("slice for {unit} has length {got}, expected {expected} periods")]
    LengthMismatch {
        unit: usize,
        got: usize,
        expected: usize,
    },

    /// A write was attempted against a sealed record.
    #[error("iteration {iteration} is sealed")]
    Sealed { iteration: usize },
}

/// Which block's slice a written-flag refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Dispatch,
    Mode,
    Slack,
    Price,
}

/// All primal/dual state for one iteration.
///
/// Arrays are indexed `[unit][period - 1]`.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    /// Dispatch fraction per unit-period.
    x: Vec<Vec<f64>>,
    /// Mode indicator vector per unit-period.
    y: Vec<Vec<[f64; NUM_MODES]>>,
    /// Slack pair per unit-period.
    s: Vec<Vec<[f64; NUM_SLACKS]>>,
    /// Dual-price vector per unit-period.
    u: Vec<Vec<[f64; NUM_PRICES]>>,
    /// Derived hydrogen production per unit-period.
    hydrogen: Vec<Vec<f64>>,
    /// Which blocks have written which unit.
    written: Vec<[bool; 4]>,
    objective: Option<f64>,
    feasible: Option<bool>,
    sealed: bool,
}

impl IterationRecord {
    fn zeroed(num_units: usize, num_periods: usize) -> Self {
        IterationRecord {
            x: vec![vec![0.0; num_periods]; num_units],
            y: vec![vec![[0.0; NUM_MODES]; num_periods]; num_units],
            s: vec![vec![[0.0; NUM_SLACKS]; num_periods]; num_units],
            u: vec![vec![[0.0; NUM_PRICES]; num_periods]; num_units],
            hydrogen: vec![vec![0.0; num_periods]; num_units],
            written: vec![[false; 4]; num_units],
            objective: None,
            feasible: None,
            sealed: false,
        }
    }

    fn num_units(&self) -> usize {
        self.x.len()
    }

    fn num_periods(&self) -> usize {
        self.x.first().map(|v| v.len()).unwrap_or(0)
    }
}

/// Arena of iteration records, the only shared mutable resource of a run.
#[derive(Debug, Default)]
pub struct IterationStore {
    records: Vec<IterationRecord>,
}

impl IterationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with capacity for `max_iterations` records.
    pub fn with_capacity(max_iterations: usize) -> Self {
        IterationStore {
            records: Vec::with_capacity(max_iterations),
        }
    }

    /// Allocate zeroed arrays for iteration `k`.
    ///
    /// Iterations must be initialized in order; the counter only moves
    /// forward. Re-initializing an existing unsealed iteration is a no-op.
    pub fn init(&mut self, k: usize, num_units: usize, num_periods: usize) -> Result<(), StoreError> {
        if k < self.records.len() {
            if self.records[k].sealed {
                return Err(StoreError::Sealed { iteration: k });
            }
            return Ok(());
        }
        if k != self.records.len() {
            return Err(StoreError::OutOfOrderInit {
                iteration: k,
                expected: self.records.len(),
            });
        }
        self.records.push(IterationRecord::zeroed(num_units, num_periods));
        Ok(())
    }

    /// Number of initialized iterations.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no iteration has been initialized yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record(&self, k: usize) -> Result<&IterationRecord, StoreError> {
        self.records
            .get(k)
            .ok_or(StoreError::UnknownIteration { iteration: k })
    }

    fn writable(
        &mut self,
        k: usize,
        unit: UnitId,
        len: usize,
    ) -> Result<&mut IterationRecord, StoreError> {
        let record = self
            .records
            .get_mut(k)
            .ok_or(StoreError::UnknownIteration { iteration: k })?;
        if record.sealed {
            return Err(StoreError::Sealed { iteration: k });
        }
        let num_units = record.num_units();
        if unit.value() >= num_units {
            return Err(StoreError::InvalidIndex {
                unit: unit.value(),
                num_units,
            });
        }
        let expected = record.num_periods();
        if len != expected {
            return Err(StoreError::LengthMismatch {
                unit: unit.value(),
                got: len,
                expected,
            });
        }
        Ok(record)
    }

    fn checked_slice<'a, T>(
        &self,
        record: &'a IterationRecord,
        unit: UnitId,
        data: &'a [Vec<T>],
        block: Block,
    ) -> Option<&'a [T]> {
        let idx = unit.value();
        if idx >= record.num_units() {
            return None;
        }
        let block_idx = block as usize;
        if !record.written[idx][block_idx] {
            return None;
        }
        Some(&data[idx])
    }

    /// Dispatch slice for a unit, if it was written.
    pub fn get_x_for_unit(&self, k: usize, unit: UnitId) -> Option<&[f64]> {
        let record = self.record(k).ok()?;
        self.checked_slice(record, unit, &record.x, Block::Dispatch)
    }

    /// Mode slice for a unit, if it was written.
    pub fn get_y_for_unit(&self, k: usize, unit: UnitId) -> Option<&[[f64; NUM_MODES]]> {
        let record = self.record(k).ok()?;
        self.checked_slice(record, unit, &record.y, Block::Mode)
    }

    /// Slack slice for a unit, if it was written.
    pub fn get_s_for_unit(&self, k: usize, unit: UnitId) -> Option<&[[f64; NUM_SLACKS]]> {
        let record = self.record(k).ok()?;
        self.checked_slice(record, unit, &record.s, Block::Slack)
    }

    /// Price slice for a unit, if it was written.
    pub fn get_u_for_unit(&self, k: usize, unit: UnitId) -> Option<&[[f64; NUM_PRICES]]> {
        let record = self.record(k).ok()?;
        self.checked_slice(record, unit, &record.u, Block::Price)
    }

    /// Hydrogen slice for a unit, if dispatch was written.
    pub fn get_hydrogen_for_unit(&self, k: usize, unit: UnitId) -> Option<&[f64]> {
        let record = self.record(k).ok()?;
        self.checked_slice(record, unit, &record.hydrogen, Block::Dispatch)
    }

    /// Dispatch slice, or the documented zero-filled default.
    pub fn x_for_unit_or_default(&self, k: usize, unit: UnitId, num_periods: usize) -> Vec<f64> {
        match self.get_x_for_unit(k, unit) {
            Some(slice) => slice.to_vec(),
            None => {
                warn!(iteration = k, %unit, "dispatch not yet computed, using zero default");
                vec![0.0; num_periods]
            }
        }
    }

    /// Mode slice, or the documented zero-filled default.
    pub fn y_for_unit_or_default(
        &self,
        k: usize,
        unit: UnitId,
        num_periods: usize,
    ) -> Vec<[f64; NUM_MODES]> {
        match self.get_y_for_unit(k, unit) {
            Some(slice) => slice.to_vec(),
            None => {
                warn!(iteration = k, %unit, "modes not yet computed, using zero default");
                vec![[0.0; NUM_MODES]; num_periods]
            }
        }
    }

    /// Slack slice, or the documented zero-filled default.
    pub fn s_for_unit_or_default(
        &self,
        k: usize,
        unit: UnitId,
        num_periods: usize,
    ) -> Vec<[f64; NUM_SLACKS]> {
        match self.get_s_for_unit(k, unit) {
            Some(slice) => slice.to_vec(),
            None => {
                warn!(iteration = k, %unit, "slacks not yet computed, using zero default");
                vec![[0.0; NUM_SLACKS]; num_periods]
            }
        }
    }

    /// Price slice, or the documented zero-filled default.
    pub fn u_for_unit_or_default(
        &self,
        k: usize,
        unit: UnitId,
        num_periods: usize,
    ) -> Vec<[f64; NUM_PRICES]> {
        match self.get_u_for_unit(k, unit) {
            Some(slice) => slice.to_vec(),
            None => {
                warn!(iteration = k, %unit, "prices not yet computed, using zero default");
                vec![[0.0; NUM_PRICES]; num_periods]
            }
        }
    }

    /// Write a unit's dispatch slice together with its derived hydrogen
    /// production.
    pub fn save_x_for_unit(
        &mut self,
        k: usize,
        unit: UnitId,
        x: &[f64],
        hydrogen: &[f64],
    ) -> Result<(), StoreError> {
        if hydrogen.len() != x.len() {
            return Err(StoreError::LengthMismatch {
                unit: unit.value(),
                got: hydrogen.len(),
                expected: x.len(),
            });
        }
        let record = self.writable(k, unit, x.len())?;
        record.x[unit.value()].copy_from_slice(x);
        record.hydrogen[unit.value()].copy_from_slice(hydrogen);
        record.written[unit.value()][Block::Dispatch as usize] = true;
        Ok(())
    }

    /// Write a unit's mode slice.
    pub fn save_y_for_unit(
        &mut self,
        k: usize,
        unit: UnitId,
        y: &[[f64; NUM_MODES]],
    ) -> Result<(), StoreError> {
        let record = self.writable(k, unit, y.len())?;
        record.y[unit.value()].copy_from_slice(y);
        record.written[unit.value()][Block::Mode as usize] = true;
        Ok(())
    }

    /// Write a unit's slack slice.
    pub fn save_s_for_unit(
        &mut self,
        k: usize,
        unit: UnitId,
        s: &[[f64; NUM_SLACKS]],
    ) -> Result<(), StoreError> {
        let record = self.writable(k, unit, s.len())?;
        record.s[unit.value()].copy_from_slice(s);
        record.written[unit.value()][Block::Slack as usize] = true;
        Ok(())
    }

    /// Write a unit's price slice.
    pub fn save_u_for_unit(
        &mut self,
        k: usize,
        unit: UnitId,
        u: &[[f64; NUM_PRICES]],
    ) -> Result<(), StoreError> {
        let record = self.writable(k, unit, u.len())?;
        record.u[unit.value()].copy_from_slice(u);
        record.written[unit.value()][Block::Price as usize] = true;
        Ok(())
    }

    /// Record the iteration-level objective value.
    pub fn save_objective(&mut self, k: usize, objective: f64) -> Result<(), StoreError> {
        let record = self
            .records
            .get_mut(k)
            .ok_or(StoreError::UnknownIteration { iteration: k })?;
        if record.sealed {
            return Err(StoreError::Sealed { iteration: k });
        }
        record.objective = Some(objective);
        Ok(())
    }

    /// Objective of iteration `k`, if recorded.
    pub fn objective(&self, k: usize) -> Option<f64> {
        self.records.get(k).and_then(|r| r.objective)
    }

    /// Record the iteration-level feasibility verdict.
    pub fn save_feasibility(&mut self, k: usize, feasible: bool) -> Result<(), StoreError> {
        let record = self
            .records
            .get_mut(k)
            .ok_or(StoreError::UnknownIteration { iteration: k })?;
        if record.sealed {
            return Err(StoreError::Sealed { iteration: k });
        }
        record.feasible = Some(feasible);
        Ok(())
    }

    /// Feasibility verdict of iteration `k`, if recorded.
    pub fn feasibility(&self, k: usize) -> Option<bool> {
        self.records.get(k).and_then(|r| r.feasible)
    }

    /// Whether every block has written every unit for iteration `k`.
    pub fn is_complete(&self, k: usize) -> bool {
        self.records
            .get(k)
            .map(|r| r.written.iter().all(|flags| flags.iter().all(|&w| w)))
            .unwrap_or(false)
    }

    /// Mark iteration `k` immutable.
    pub fn seal(&mut self, k: usize) -> Result<(), StoreError> {
        let record = self
            .records
            .get_mut(k)
            .ok_or(StoreError::UnknownIteration { iteration: k })?;
        record.sealed = true;
        Ok(())
    }

    /// Whether iteration `k` is sealed.
    pub fn is_sealed(&self, k: usize) -> bool {
        self.records.get(k).map(|r| r.sealed).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(i: usize) -> UnitId {
        UnitId::new(i)
    }

    #[test]
    fn save_before_init_fails() {
        let mut store = IterationStore::new();
        let err = store.save_x_for_unit(0, unit(0), &[0.5], &[1.0]);
        assert_eq!(
            err,
            Err(StoreError::UnknownIteration { iteration: 0 })
        );
    }

    #[test]
    fn init_out_of_order_fails() {
        let mut store = IterationStore::new();
        assert_eq!(
            store.init(2, 1, 4),
            Err(StoreError::OutOfOrderInit {
                iteration: 2,
                expected: 0
            })
        );
    }

    #[test]
    fn x_round_trip() {
        let mut store = IterationStore::new();
        store.init(0, 2, 3).unwrap();
        let x = [0.1, 0.5, 0.9];
        let h = [1.0, 5.0, 9.0];
        store.save_x_for_unit(0, unit(1), &x, &h).unwrap();
        assert_eq!(store.get_x_for_unit(0, unit(1)).unwrap(), &x);
        assert_eq!(store.get_hydrogen_for_unit(0, unit(1)).unwrap(), &h);
        // Unit 0 never written: no slice.
        assert!(store.get_x_for_unit(0, unit(0)).is_none());
    }

    #[test]
    fn default_fill_for_unwritten_slice() {
        let mut store = IterationStore::new();
        store.init(0, 1, 4).unwrap();
        let x = store.x_for_unit_or_default(0, unit(0), 4);
        assert_eq!(x, vec![0.0; 4]);
        let u = store.u_for_unit_or_default(3, unit(0), 4);
        assert_eq!(u.len(), 4);
    }

    #[test]
    fn invalid_unit_index_rejected() {
        let mut store = IterationStore::new();
        store.init(0, 1, 2).unwrap();
        let err = store.save_s_for_unit(0, unit(5), &[[0.0; NUM_SLACKS]; 2]);
        assert_eq!(
            err,
            Err(StoreError::InvalidIndex {
                unit: 5,
                num_units: 1
            })
        );
    }

    #[test]
    fn length_mismatch_rejected() {
        let mut store = IterationStore::new();
        store.init(0, 1, 4).unwrap();
        let err = store.save_x_for_unit(0, unit(0), &[0.0; 3], &[0.0; 3]);
        assert!(matches!(err, Err(StoreError::LengthMismatch { .. })));
    }

    #[test]
    fn sealed_record_rejects_writes() {
        let mut store = IterationStore::new();
        store.init(0, 1, 2).unwrap();
        store.save_objective(0, 12.0).unwrap();
        store.seal(0).unwrap();
        let err = store.save_u_for_unit(0, unit(0), &[[0.0; NUM_PRICES]; 2]);
        assert_eq!(err, Err(StoreError::Sealed { iteration: 0 }));
        assert_eq!(store.objective(0), Some(12.0));
    }

    #[test]
    fn completeness_tracks_all_blocks() {
        let mut store = IterationStore::new();
        store.init(0, 1, 1).unwrap();
        assert!(!store.is_complete(0));
        store.save_x_for_unit(0, unit(0), &[0.5], &[2.0]).unwrap();
        store
            .save_y_for_unit(0, unit(0), &[[0.0, 0.0, 1.0, 0.0]])
            .unwrap();
        store.save_s_for_unit(0, unit(0), &[[0.0; NUM_SLACKS]]).unwrap();
        store.save_u_for_unit(0, unit(0), &[[0.0; NUM_PRICES]]).unwrap();
        assert!(store.is_complete(0));
    }

    #[test]
    fn objective_and_feasibility_round_trip() {
        let mut store = IterationStore::new();
        store.init(0, 1, 1).unwrap();
        store.save_objective(0, 42.5).unwrap();
        store.save_feasibility(0, false).unwrap();
        assert_eq!(store.objective(0), Some(42.5));
        assert_eq!(store.feasibility(0), Some(false));
        assert_eq!(store.objective(1), None);
    }
}
