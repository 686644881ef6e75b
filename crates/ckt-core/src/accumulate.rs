//! Thread-safe float accumulation.
//!
//! Parallel device loads add into shared matrix and RHS storage. Every add
//! goes through [`SharedAccumulator::add`], which is backed by one of two
//! implementations chosen at build time:
//!
//! - default: lock-free compare-and-swap loop over the `f64` bit pattern
//! - `serialized-accumulate`: every add is serialized behind one mutex
//!
//! Summation order across threads is unspecified, so results may differ in
//! the last bits between thread counts.

use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "serialized-accumulate")]
use std::sync::Mutex;

/// Add `value` to the `f64` stored (as bits) in `cell`, retrying until the
/// compare-and-swap succeeds.
#[inline]
pub fn atomic_add(cell: &AtomicU64, value: f64) {
    let mut current = cell.load(Ordering::Relaxed);
    loop {
        let next = (f64::from_bits(current) + value).to_bits();
        match cell.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}

/// Fixed-length vector of `f64` cells that many threads may add into.
#[derive(Debug)]
pub struct SharedAccumulator {
    cells: Vec<AtomicU64>,
    #[cfg(feature = "serialized-accumulate")]
    lock: Mutex<()>,
}

impl SharedAccumulator {
    /// Create `len` cells, all zero.
    pub fn new(len: usize) -> Self {
        Self {
            cells: (0..len).map(|_| AtomicU64::new(0.0_f64.to_bits())).collect(),
            #[cfg(feature = "serialized-accumulate")]
            lock: Mutex::new(()),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Accumulate `value` into cell `index`.
    #[cfg(not(feature = "serialized-accumulate"))]
    #[inline]
    pub fn add(&self, index: usize, value: f64) {
        atomic_add(&self.cells[index], value);
    }

    /// Accumulate `value` into cell `index`.
    #[cfg(feature = "serialized-accumulate")]
    #[inline]
    pub fn add(&self, index: usize, value: f64) {
        // A poisoned lock still guards plain data; keep accumulating.
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let cell = &self.cells[index];
        let sum = f64::from_bits(cell.load(Ordering::Relaxed)) + value;
        cell.store(sum.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self, index: usize) -> f64 {
        f64::from_bits(self.cells[index].load(Ordering::Acquire))
    }

    /// Zero every cell. Requires exclusive access, so no worker can be
    /// accumulating concurrently.
    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            *cell.get_mut() = 0.0_f64.to_bits();
        }
    }

    /// Resize to `len` cells and zero them.
    pub fn resize(&mut self, len: usize) {
        self.cells.resize_with(len, || AtomicU64::new(0.0_f64.to_bits()));
        self.reset();
    }

    /// Snapshot of the accumulated values.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.cells
            .iter()
            .map(|c| f64::from_bits(c.load(Ordering::Acquire)))
    }
}
