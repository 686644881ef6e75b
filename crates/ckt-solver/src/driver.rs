//! One factor-and-solve attempt per Newton iteration.
//!
//! The driver walks `NeedReorder -> Factor -> Solve -> Done`. A numeric
//! refactor that hits a singular pivot is recovered once per call: the
//! matrix is reloaded (with the RHS contributions diverted into the spare
//! buffers so the already loaded RHS survives) and a full reorder is run.
//! Any failure after that, or any non-singular failure, is returned as-is.

use crate::error::{LoadError, MatrixError, SolveError, SolveResult};
use crate::matrix::{MatrixHandle, PivotSettings};
use crate::rhs::RhsBuffers;
use ckt_core::{AccumulatingTimer, Timer};

/// Device-load seam consumed by the driver.
///
/// `load` must only accumulate into the matrix and `buffers.rhs`/`irhs`;
/// the caller clears them first. It reads the previous iterate from
/// `buffers.rhs_old`.
pub trait LoadCallback {
    fn load(&mut self, matrix: &mut dyn MatrixHandle, buffers: &mut RhsBuffers)
    -> Result<(), LoadError>;

    /// Rebind to the matrix after its storage moved.
    fn resetup(&mut self, _matrix: &mut dyn MatrixHandle) -> Result<(), LoadError> {
        Ok(())
    }
}

impl<F> LoadCallback for F
where
    F: FnMut(&mut dyn MatrixHandle, &mut RhsBuffers) -> Result<(), LoadError>,
{
    fn load(
        &mut self,
        matrix: &mut dyn MatrixHandle,
        buffers: &mut RhsBuffers,
    ) -> Result<(), LoadError> {
        self(matrix, buffers)
    }
}

/// Counters and timers for the linear solve layer.
#[derive(Debug, Default)]
pub struct SolveStats {
    pub factors: u64,
    pub reorders: u64,
    pub solves: u64,
    pub recoveries: u64,
    pub resetups: u64,
    pub factor_time: AccumulatingTimer,
    pub solve_time: AccumulatingTimer,
}

/// What a successful [`SolveDriver::solve`] had to do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolveReport {
    /// A full order-and-factor ran.
    pub reordered: bool,
    /// A singular refactor was recovered by reload + reorder.
    pub recovered: bool,
    /// Storage moved and the load side was re-setup.
    pub resetup: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    NeedReorder,
    Factor,
    Solve,
    Done,
}

/// Per-circuit solve driver; owns the reorder-pending flag.
#[derive(Debug)]
pub struct SolveDriver {
    pivots: PivotSettings,
    reorder_pending: bool,
    stats: SolveStats,
}

impl Default for SolveDriver {
    fn default() -> Self {
        Self::new(PivotSettings::default())
    }
}

impl SolveDriver {
    /// A new driver; the first solve always reorders.
    pub fn new(pivots: PivotSettings) -> Self {
        Self {
            pivots,
            reorder_pending: true,
            stats: SolveStats::default(),
        }
    }

    pub fn pivots(&self) -> &PivotSettings {
        &self.pivots
    }

    pub fn set_pivots(&mut self, pivots: PivotSettings) {
        self.pivots = pivots;
    }

    /// Ask for a full reorder on the next solve.
    pub fn request_reorder(&mut self) {
        self.reorder_pending = true;
    }

    pub fn reorder_pending(&self) -> bool {
        self.reorder_pending
    }

    pub fn stats(&self) -> &SolveStats {
        &self.stats
    }

    /// Factor the loaded matrix and solve against `buffers.rhs`.
    ///
    /// On success the new solution is in `buffers.rhs_old` (and the previous
    /// iterate in `buffers.rhs`), with every ground slot zeroed.
    pub fn solve(
        &mut self,
        matrix: &mut dyn MatrixHandle,
        buffers: &mut RhsBuffers,
        loader: &mut dyn LoadCallback,
    ) -> SolveResult<SolveReport> {
        let mut report = SolveReport::default();

        if matrix.storage_moved() {
            tracing::debug!("matrix storage moved, re-running setup");
            loader.resetup(matrix)?;
            reload(matrix, buffers, loader)?;
            self.stats.resetups += 1;
            self.reorder_pending = true;
            report.resetup = true;
        }

        let mut phase = if self.reorder_pending {
            Phase::NeedReorder
        } else {
            Phase::Factor
        };

        loop {
            phase = match phase {
                Phase::NeedReorder => {
                    let timer = Timer::start("order_and_factor");
                    let result = matrix.order_and_factor(&self.pivots);
                    timer.stop_into(&self.stats.factor_time);
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "order and factor failed");
                        return Err(e.into());
                    }
                    self.stats.reorders += 1;
                    self.reorder_pending = false;
                    report.reordered = true;
                    Phase::Solve
                }
                Phase::Factor => {
                    let timer = Timer::start("factor");
                    let result = matrix.factor();
                    timer.stop_into(&self.stats.factor_time);
                    match result {
                        Ok(()) => {
                            self.stats.factors += 1;
                            Phase::Solve
                        }
                        Err(MatrixError::Singular { row }) if !report.recovered => {
                            tracing::debug!(row, "singular refactor, forcing reorder");
                            self.reorder_pending = true;
                            reload(matrix, buffers, loader)?;
                            self.stats.recoveries += 1;
                            report.recovered = true;
                            Phase::NeedReorder
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Phase::Solve => {
                    let timer = Timer::start("solve");
                    let result = matrix.solve(&mut buffers.rhs, &mut buffers.irhs);
                    timer.stop_into(&self.stats.solve_time);
                    result?;
                    self.stats.solves += 1;
                    buffers.zero_ground();
                    buffers.swap_old();
                    Phase::Done
                }
                Phase::Done => return Ok(report),
            };
        }
    }
}

/// Rebuild the matrix through `loader` while the primary RHS is parked in
/// the spare slot, so the RHS already loaded for this iteration is kept.
fn reload(
    matrix: &mut dyn MatrixHandle,
    buffers: &mut RhsBuffers,
    loader: &mut dyn LoadCallback,
) -> Result<(), SolveError> {
    buffers.swap_spare();
    buffers.clear_rhs();
    matrix.clear();
    let result = loader.load(matrix, buffers);
    buffers.swap_spare();
    result.map_err(SolveError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::DenseMatrix;

    fn stamp_pair(m: &mut dyn MatrixHandle, b: &mut RhsBuffers) -> Result<(), LoadError> {
        // x1 + x2 = 3, x1 - x2 = 1
        m.add(1, 1, 1.0);
        m.add(1, 2, 1.0);
        m.add(2, 1, 1.0);
        m.add(2, 2, -1.0);
        b.rhs[1] += 3.0;
        b.rhs[2] += 1.0;
        Ok(())
    }

    fn loaded(m: &mut DenseMatrix, b: &mut RhsBuffers) {
        m.clear();
        b.clear_rhs();
        stamp_pair(m, b).unwrap();
    }

    #[test]
    fn first_solve_reorders_then_reuses_order() {
        let mut m = DenseMatrix::new(2);
        let mut b = RhsBuffers::new(2);
        let mut driver = SolveDriver::default();
        let mut loader = stamp_pair;

        loaded(&mut m, &mut b);
        let report = driver.solve(&mut m, &mut b, &mut loader).unwrap();
        assert!(report.reordered);
        assert!((b.solution()[1] - 2.0).abs() < 1e-12);
        assert!((b.solution()[2] - 1.0).abs() < 1e-12);

        loaded(&mut m, &mut b);
        let report = driver.solve(&mut m, &mut b, &mut loader).unwrap();
        assert!(!report.reordered);
        assert_eq!(driver.stats().factors, 1);
        assert_eq!(driver.stats().reorders, 1);
        assert_eq!(driver.stats().solves, 2);
    }

    #[test]
    fn solution_lands_in_old_and_ground_is_zeroed() {
        let mut m = DenseMatrix::new(2);
        let mut b = RhsBuffers::new(2);
        b.rhs_old[1] = 42.0;
        loaded(&mut m, &mut b);
        b.rhs[0] = 7.0;
        SolveDriver::default()
            .solve(&mut m, &mut b, &mut stamp_pair)
            .unwrap();
        assert_eq!(b.rhs_old[0], 0.0);
        assert_eq!(b.rhs[0], 0.0);
        // previous iterate swapped into rhs
        assert_eq!(b.rhs[1], 42.0);
    }

    #[test]
    fn reorder_failure_is_returned_unchanged() {
        let mut m = DenseMatrix::new(1);
        let mut b = RhsBuffers::new(1);
        let mut calls = 0;
        let mut loader = |_: &mut dyn MatrixHandle, _: &mut RhsBuffers| {
            calls += 1;
            Ok::<(), LoadError>(())
        };
        let err = SolveDriver::default()
            .solve(&mut m, &mut b, &mut loader)
            .unwrap_err();
        assert!(err.is_singular());
        assert_eq!(calls, 0);
    }

    #[test]
    fn complex_solve_fills_imaginary_old() {
        // (1 + j) x1 = 2 + 2j, 2 x2 = 4j
        let mut loader = |m: &mut dyn MatrixHandle, b: &mut RhsBuffers| {
            m.add_complex(1, 1, 1.0, 1.0);
            m.add_complex(2, 2, 2.0, 0.0);
            b.rhs[1] += 2.0;
            b.irhs[1] += 2.0;
            b.irhs[2] += 4.0;
            Ok::<(), LoadError>(())
        };
        let mut m = DenseMatrix::new(2);
        m.set_complex(true);
        let mut b = RhsBuffers::new(2);
        b.clear_rhs();
        loader(&mut m, &mut b).unwrap();
        b.irhs[0] = 3.0;
        b.irhs_old[1] = -8.0;

        SolveDriver::default()
            .solve(&mut m, &mut b, &mut loader)
            .unwrap();
        assert!((b.solution()[1] - 2.0).abs() < 1e-12);
        assert!(b.imag_solution()[1].abs() < 1e-12);
        assert!(b.solution()[2].abs() < 1e-12);
        assert!((b.imag_solution()[2] - 2.0).abs() < 1e-12);
        assert_eq!(b.irhs_old[0], 0.0);
        assert_eq!(b.irhs[0], 0.0);
        // previous imaginary iterate swapped into irhs
        assert_eq!(b.irhs[1], -8.0);
    }

    #[test]
    fn moved_storage_triggers_resetup_and_reorder() {
        let mut m = DenseMatrix::new(1);
        let mut b = RhsBuffers::new(2);
        let mut driver = SolveDriver::default();

        loaded(&mut DenseMatrix::new(2), &mut b);
        m.resize(2);
        let report = driver.solve(&mut m, &mut b, &mut stamp_pair).unwrap();
        assert!(report.resetup);
        assert!(report.reordered);
        assert_eq!(driver.stats().resetups, 1);
        // RHS loaded before the move was kept
        assert!((b.solution()[1] - 2.0).abs() < 1e-12);
    }
}
