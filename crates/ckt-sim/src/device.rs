//! Device seam for the threaded loader.
//!
//! Devices register their matrix entries and state slots once at setup and
//! then stamp through a [`StampSink`] on every load. The sink accumulates
//! into shared cells, so devices may load concurrently.

use crate::companion::Companion;
use crate::state::Mode;
use ckt_core::{GROUND, SharedAccumulator};
use ckt_solver::LoadError;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Handle to a registered matrix entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId(usize);

impl EntryId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Matrix entries registered by devices, in registration order.
#[derive(Clone, Debug, Default)]
pub struct MatrixPattern {
    size: usize,
    index: HashMap<(usize, usize), EntryId>,
    entries: Vec<(usize, usize)>,
}

impl MatrixPattern {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Register `(row, col)`; `None` when either side is ground.
    pub fn entry(&mut self, row: usize, col: usize) -> Option<EntryId> {
        if row == GROUND || col == GROUND {
            return None;
        }
        let entries = &mut self.entries;
        let id = *self.index.entry((row, col)).or_insert_with(|| {
            entries.push((row, col));
            EntryId(entries.len() - 1)
        });
        Some(id)
    }

    /// Registered `(row, col)` pairs, indexed by [`EntryId::index`].
    pub fn entries(&self) -> &[(usize, usize)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hands out contiguous state slots at setup.
#[derive(Clone, Debug, Default)]
pub struct StateAllocator {
    next: usize,
}

impl StateAllocator {
    pub fn alloc(&mut self, count: usize) -> Range<usize> {
        let start = self.next;
        self.next += count;
        start..self.next
    }

    /// Slots allocated so far.
    pub fn allocated(&self) -> usize {
        self.next
    }
}

/// Shared accumulation target for concurrent device loads.
pub struct StampSink<'a> {
    matrix: &'a SharedAccumulator,
    rhs: &'a SharedAccumulator,
    noncon: &'a AtomicUsize,
}

impl<'a> StampSink<'a> {
    pub fn new(
        matrix: &'a SharedAccumulator,
        rhs: &'a SharedAccumulator,
        noncon: &'a AtomicUsize,
    ) -> Self {
        Self {
            matrix,
            rhs,
            noncon,
        }
    }

    /// Add `value` to a registered entry; ground entries are dropped.
    #[inline]
    pub fn add_matrix(&self, entry: Option<EntryId>, value: f64) {
        if let Some(id) = entry {
            self.matrix.add(id.0, value);
        }
    }

    /// Add `value` to the right-hand side at `node`; ground is dropped.
    #[inline]
    pub fn add_rhs(&self, node: usize, value: f64) {
        if node != GROUND {
            self.rhs.add(node, value);
        }
    }

    /// Report that this device has not converged (e.g. a limited junction).
    pub fn flag_noncon(&self) {
        self.noncon.fetch_add(1, Ordering::Relaxed);
    }
}

/// Read-only inputs to a device load.
#[derive(Clone, Copy, Debug)]
pub struct DeviceContext<'a> {
    /// Previous iterate, indexed by unknown.
    pub solution: &'a [f64],
    pub mode: Mode,
    pub time: f64,
    pub gmin: f64,
}

impl DeviceContext<'_> {
    /// Voltage of `node`, zero for ground.
    pub fn voltage(&self, node: usize) -> f64 {
        self.solution.get(node).copied().unwrap_or(0.0)
    }
}

pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    /// Register matrix entries and claim state slots.
    fn setup(&mut self, pattern: &mut MatrixPattern, states: &mut StateAllocator);

    /// Stamp this device's contribution at the current iterate.
    ///
    /// `companion` covers exactly the state slots claimed at setup.
    fn load(
        &self,
        ctx: &DeviceContext<'_>,
        companion: &mut Companion<'_>,
        sink: &StampSink<'_>,
    ) -> Result<(), LoadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_dedups_and_skips_ground() {
        let mut p = MatrixPattern::new(3);
        let a = p.entry(1, 2);
        let b = p.entry(1, 2);
        assert_eq!(a, b);
        assert_eq!(p.entry(0, 2), None);
        assert_eq!(p.entry(2, 0), None);
        let c = p.entry(2, 2).unwrap();
        assert_eq!(c.index(), 1);
        assert_eq!(p.entries(), &[(1, 2), (2, 2)]);
    }

    #[test]
    fn allocator_hands_out_disjoint_ranges() {
        let mut a = StateAllocator::default();
        assert_eq!(a.alloc(2), 0..2);
        assert_eq!(a.alloc(0), 2..2);
        assert_eq!(a.alloc(3), 2..5);
        assert_eq!(a.allocated(), 5);
    }

    #[test]
    fn sink_drops_ground_and_counts_noncon() {
        let m = SharedAccumulator::new(1);
        let r = SharedAccumulator::new(3);
        let n = AtomicUsize::new(0);
        let sink = StampSink::new(&m, &r, &n);
        sink.add_matrix(None, 5.0);
        sink.add_matrix(Some(EntryId(0)), 2.0);
        sink.add_rhs(GROUND, 9.0);
        sink.add_rhs(2, 1.5);
        sink.flag_noncon();
        assert_eq!(m.get(0), 2.0);
        assert_eq!(r.get(0), 0.0);
        assert_eq!(r.get(2), 1.5);
        assert_eq!(n.load(Ordering::Relaxed), 1);
    }
}
