//! Abstract matrix interface.

use crate::error::MatrixResult;

/// Pivot selection thresholds used when the elimination order is rebuilt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PivotSettings {
    /// A candidate pivot is acceptable when it is at least this fraction of
    /// the largest entry in its column.
    pub rel_tol: f64,
    /// Pivots at or below this magnitude are treated as zero.
    pub abs_tol: f64,
    /// Prefer diagonal pivots when they pass the relative test.
    pub diagonal: bool,
}

impl Default for PivotSettings {
    fn default() -> Self {
        Self {
            rel_tol: 1e-3,
            abs_tol: 1e-13,
            diagonal: true,
        }
    }
}

/// The order/factor/solve surface the engine needs from a matrix package.
///
/// Row and column indices are 1-based: index 0 is the ground node, and
/// stamps that touch it are dropped. Solution and RHS slices are
/// `size() + 1` long with slot 0 reserved for ground.
pub trait MatrixHandle {
    /// Number of unknowns, ground excluded.
    fn size(&self) -> usize;

    fn set_complex(&mut self, complex: bool);

    fn is_complex(&self) -> bool;

    /// Whether the backing storage was reallocated since the last query.
    /// Answers `true` once per move.
    fn storage_moved(&mut self) -> bool;

    /// Zero every entry, keeping the structure.
    fn clear(&mut self);

    fn add(&mut self, row: usize, col: usize, value: f64);

    fn add_complex(&mut self, row: usize, col: usize, re: f64, im: f64);

    /// Choose a fresh elimination order and factor.
    fn order_and_factor(&mut self, pivots: &PivotSettings) -> MatrixResult<()>;

    /// Factor numerically, reusing the previous elimination order.
    fn factor(&mut self) -> MatrixResult<()>;

    /// Solve in place: `rhs`/`irhs` hold the right-hand side on entry and the
    /// solution on return. `irhs` is ignored in real mode.
    fn solve(&self, rhs: &mut [f64], irhs: &mut [f64]) -> MatrixResult<()>;

    /// Like [`MatrixHandle::solve`] against the transposed matrix.
    fn solve_transposed(&self, rhs: &mut [f64], irhs: &mut [f64]) -> MatrixResult<()>;
}
