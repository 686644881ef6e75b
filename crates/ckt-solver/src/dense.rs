//! Dense LU reference implementation of [`MatrixHandle`].
//!
//! Suitable for small circuits and for exercising the driver. Values live in
//! nalgebra matrices; factorization is row-pivoted Doolittle elimination so
//! that a numeric refactor can reuse the previous row order exactly.

use crate::error::{MatrixError, MatrixResult};
use crate::matrix::{MatrixHandle, PivotSettings};
use nalgebra::{Complex, ComplexField, DMatrix};

#[derive(Clone, Debug)]
enum Factors {
    None,
    Real(DMatrix<f64>),
    Complex(DMatrix<Complex<f64>>),
}

/// Dense matrix with threshold-pivoted LU.
#[derive(Clone, Debug)]
pub struct DenseMatrix {
    n: usize,
    complex: bool,
    moved: bool,
    real: DMatrix<f64>,
    imag: DMatrix<f64>,
    /// `perm[k]` is the original row placed at elimination step `k`.
    perm: Vec<usize>,
    abs_tol: f64,
    factors: Factors,
}

impl DenseMatrix {
    /// A zero matrix for `size` unknowns.
    pub fn new(size: usize) -> Self {
        Self {
            n: size,
            complex: false,
            moved: false,
            real: DMatrix::zeros(size, size),
            imag: DMatrix::zeros(size, size),
            perm: (0..size).collect(),
            abs_tol: 0.0,
            factors: Factors::None,
        }
    }

    /// Reallocate for `size` unknowns. The previous order and factors are
    /// discarded and the next [`MatrixHandle::storage_moved`] reports `true`.
    pub fn resize(&mut self, size: usize) {
        *self = Self::new(size);
        self.moved = true;
    }

    /// Loaded value at 1-based `(row, col)`.
    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.real[(row - 1, col - 1)]
    }

    /// Current elimination row order (0-based rows).
    pub fn row_order(&self) -> &[usize] {
        &self.perm
    }

    pub fn is_factored(&self) -> bool {
        !matches!(self.factors, Factors::None)
    }

    fn permuted<T: Copy>(&self, at: impl Fn(usize, usize) -> T) -> DMatrix<T>
    where
        T: nalgebra::Scalar,
    {
        DMatrix::from_fn(self.n, self.n, |i, j| at(self.perm[i], j))
    }

    fn factor_with(&mut self, pivots: Option<&PivotSettings>) -> MatrixResult<()> {
        self.factors = Factors::None;
        if self.complex {
            let mut a = self.permuted(|i, j| Complex::new(self.real[(i, j)], self.imag[(i, j)]));
            lu_in_place(&mut a, &mut self.perm, pivots, self.abs_tol)?;
            self.factors = Factors::Complex(a);
        } else {
            let mut a = self.permuted(|i, j| self.real[(i, j)]);
            lu_in_place(&mut a, &mut self.perm, pivots, self.abs_tol)?;
            self.factors = Factors::Real(a);
        }
        Ok(())
    }

    fn check_len(&self, v: &[f64]) -> MatrixResult<()> {
        if v.len() != self.n + 1 {
            return Err(MatrixError::SizeMismatch {
                expected: self.n + 1,
                actual: v.len(),
            });
        }
        Ok(())
    }

    fn solve_inner(&self, rhs: &mut [f64], irhs: &mut [f64], transposed: bool) -> MatrixResult<()> {
        self.check_len(rhs)?;
        match &self.factors {
            Factors::None => Err(MatrixError::NotFactored),
            Factors::Real(lu) => {
                let x = substitute(lu, &self.perm, rhs[1..].to_vec(), transposed);
                rhs[1..].copy_from_slice(&x);
                Ok(())
            }
            Factors::Complex(lu) => {
                self.check_len(irhs)?;
                let b = rhs[1..]
                    .iter()
                    .zip(&irhs[1..])
                    .map(|(re, im)| Complex::new(*re, *im))
                    .collect();
                let x = substitute(lu, &self.perm, b, transposed);
                for (k, z) in x.into_iter().enumerate() {
                    rhs[k + 1] = z.re;
                    irhs[k + 1] = z.im;
                }
                Ok(())
            }
        }
    }
}

/// Row-pivoted LU in place. With `pivots` the row order is rebuilt by
/// threshold pivoting; without, rows are eliminated in the given order.
fn lu_in_place<T>(
    a: &mut DMatrix<T>,
    perm: &mut [usize],
    pivots: Option<&PivotSettings>,
    abs_tol: f64,
) -> MatrixResult<()>
where
    T: ComplexField<RealField = f64> + Copy,
{
    let n = a.nrows();
    for k in 0..n {
        if let Some(p) = pivots {
            let (mut best, mut best_mag) = (k, 0.0);
            for i in k..n {
                let mag = a[(i, k)].modulus();
                if mag > best_mag {
                    best = i;
                    best_mag = mag;
                }
            }
            if best_mag <= abs_tol {
                return Err(MatrixError::Singular { row: perm[k] + 1 });
            }
            let diag_ok = p.diagonal && a[(k, k)].modulus() >= p.rel_tol * best_mag;
            if !diag_ok && best != k {
                a.swap_rows(k, best);
                perm.swap(k, best);
            }
        }

        let pivot = a[(k, k)];
        if pivot.modulus() <= abs_tol {
            return Err(MatrixError::Singular { row: perm[k] + 1 });
        }
        for i in k + 1..n {
            let l = a[(i, k)] / pivot;
            a[(i, k)] = l;
            for j in k + 1..n {
                a[(i, j)] = a[(i, j)] - l * a[(k, j)];
            }
        }
    }
    Ok(())
}

/// Forward/back substitution against packed LU factors.
fn substitute<T>(lu: &DMatrix<T>, perm: &[usize], b: Vec<T>, transposed: bool) -> Vec<T>
where
    T: ComplexField<RealField = f64> + Copy,
{
    let n = lu.nrows();
    if !transposed {
        // L y = P b
        let mut y: Vec<T> = perm.iter().map(|&r| b[r]).collect();
        for i in 0..n {
            for j in 0..i {
                y[i] = y[i] - lu[(i, j)] * y[j];
            }
        }
        // U x = y
        for i in (0..n).rev() {
            for j in i + 1..n {
                y[i] = y[i] - lu[(i, j)] * y[j];
            }
            y[i] = y[i] / lu[(i, i)];
        }
        y
    } else {
        // U^T w = b
        let mut w = b;
        for i in 0..n {
            for j in 0..i {
                w[i] = w[i] - lu[(j, i)] * w[j];
            }
            w[i] = w[i] / lu[(i, i)];
        }
        // L^T z = w
        for i in (0..n).rev() {
            for j in i + 1..n {
                w[i] = w[i] - lu[(j, i)] * w[j];
            }
        }
        // x = P^T z
        let mut x = w.clone();
        for (k, &r) in perm.iter().enumerate() {
            x[r] = w[k];
        }
        x
    }
}

impl MatrixHandle for DenseMatrix {
    fn size(&self) -> usize {
        self.n
    }

    fn set_complex(&mut self, complex: bool) {
        if self.complex != complex {
            self.factors = Factors::None;
        }
        self.complex = complex;
    }

    fn is_complex(&self) -> bool {
        self.complex
    }

    fn storage_moved(&mut self) -> bool {
        std::mem::take(&mut self.moved)
    }

    fn clear(&mut self) {
        self.real.fill(0.0);
        self.imag.fill(0.0);
        self.factors = Factors::None;
    }

    fn add(&mut self, row: usize, col: usize, value: f64) {
        if row == 0 || col == 0 {
            return;
        }
        self.real[(row - 1, col - 1)] += value;
    }

    fn add_complex(&mut self, row: usize, col: usize, re: f64, im: f64) {
        if row == 0 || col == 0 {
            return;
        }
        self.real[(row - 1, col - 1)] += re;
        self.imag[(row - 1, col - 1)] += im;
    }

    fn order_and_factor(&mut self, pivots: &PivotSettings) -> MatrixResult<()> {
        self.abs_tol = pivots.abs_tol;
        self.perm = (0..self.n).collect();
        self.factor_with(Some(pivots))
    }

    fn factor(&mut self) -> MatrixResult<()> {
        self.factor_with(None)
    }

    fn solve(&self, rhs: &mut [f64], irhs: &mut [f64]) -> MatrixResult<()> {
        self.solve_inner(rhs, irhs, false)
    }

    fn solve_transposed(&self, rhs: &mut [f64], irhs: &mut [f64]) -> MatrixResult<()> {
        self.solve_inner(rhs, irhs, true)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn diagonally_dominant_systems_solve(
            off in prop::collection::vec(-1.0_f64..1.0, 12),
            b in prop::collection::vec(-10.0_f64..10.0, 4),
        ) {
            let n = 4;
            let mut m = DenseMatrix::new(n);
            let mut a = vec![vec![0.0; n]; n];
            let mut k = 0;
            for i in 0..n {
                for j in 0..n {
                    if i == j {
                        a[i][j] = 5.0;
                    } else {
                        a[i][j] = off[k];
                        k += 1;
                    }
                    m.add(i + 1, j + 1, a[i][j]);
                }
            }
            m.order_and_factor(&PivotSettings::default()).unwrap();
            let mut rhs: Vec<f64> = std::iter::once(0.0).chain(b.iter().copied()).collect();
            let mut irhs = vec![0.0; n + 1];
            m.solve(&mut rhs, &mut irhs).unwrap();
            for i in 0..n {
                let r: f64 = (0..n).map(|j| a[i][j] * rhs[j + 1]).sum();
                prop_assert!((r - b[i]).abs() < 1e-9);
            }
        }
    }
}
