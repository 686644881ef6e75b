//! Adjoint (transposed) solve against an existing factorization.

use crate::error::{MatrixError, SolveError, SolveResult};
use crate::matrix::MatrixHandle;
use crate::rhs::RhsBuffers;
use ckt_core::GROUND;

/// Drive a unit current into `pos` and out of `neg` and solve the
/// transposed system, leaving the adjoint response in `buffers.rhs` and
/// `buffers.irhs`.
///
/// The matrix must already be factored by a forward solve; nothing is
/// refactored here. Either drive node may be ground, but not both and not
/// the same node twice.
pub fn adjoint_solve(
    matrix: &dyn MatrixHandle,
    buffers: &mut RhsBuffers,
    pos: usize,
    neg: usize,
) -> SolveResult<()> {
    if pos == neg {
        return Err(SolveError::SameDriveNodes { node: pos });
    }
    let size = matrix.size();
    for index in [pos, neg] {
        if index > size {
            return Err(MatrixError::BadIndex { index, size }.into());
        }
    }

    buffers.clear_rhs();
    buffers.rhs[pos] = 1.0;
    buffers.rhs[neg] = -1.0;

    matrix.solve_transposed(&mut buffers.rhs, &mut buffers.irhs)?;

    buffers.rhs[GROUND] = 0.0;
    buffers.irhs[GROUND] = 0.0;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::DenseMatrix;
    use crate::matrix::PivotSettings;

    fn factored() -> DenseMatrix {
        let mut m = DenseMatrix::new(2);
        // unsymmetric so the transpose matters
        m.add(1, 1, 2.0);
        m.add(1, 2, 1.0);
        m.add(2, 2, 4.0);
        m.order_and_factor(&PivotSettings::default()).unwrap();
        m
    }

    #[test]
    fn unit_drive_between_nodes() {
        let m = factored();
        let mut b = RhsBuffers::new(2);
        adjoint_solve(&m, &mut b, 1, 2).unwrap();
        // A^T x = [1, -1]: 2 x1 = 1, x1 + 4 x2 = -1
        assert!((b.rhs[1] - 0.5).abs() < 1e-12);
        assert!((b.rhs[2] + 0.375).abs() < 1e-12);
        assert_eq!(b.rhs[0], 0.0);
    }

    #[test]
    fn drive_to_ground_zeroes_sentinel() {
        let m = factored();
        let mut b = RhsBuffers::new(2);
        b.irhs[2] = 9.0;
        adjoint_solve(&m, &mut b, 2, 0).unwrap();
        assert_eq!(b.rhs[0], 0.0);
        assert_eq!(b.irhs[0], 0.0);
        assert_eq!(b.rhs[1], 0.0);
        assert!((b.rhs[2] - 0.25).abs() < 1e-12);
        assert_eq!(b.irhs[2], 0.0);
    }

    #[test]
    fn out_of_range_drive_is_rejected() {
        let m = factored();
        let mut b = RhsBuffers::new(2);
        let err = adjoint_solve(&m, &mut b, 3, 0).unwrap_err();
        assert!(matches!(
            err,
            SolveError::Matrix(MatrixError::BadIndex { index: 3, size: 2 })
        ));
    }

    #[test]
    fn same_node_drive_is_rejected() {
        let m = factored();
        let mut b = RhsBuffers::new(2);
        b.rhs[1] = 5.0;
        let err = adjoint_solve(&m, &mut b, 1, 1).unwrap_err();
        assert_eq!(err, SolveError::SameDriveNodes { node: 1 });
        assert!(adjoint_solve(&m, &mut b, 0, 0).is_err());
        // buffers untouched on rejection
        assert_eq!(b.rhs[1], 5.0);
    }
}
