//! Linear solve layer for the circuit engine.
//!
//! This crate provides:
//! - [`MatrixHandle`], the order/factor/solve interface the engine drives
//! - [`DenseMatrix`], an LU reference implementation on nalgebra storage
//! - [`RhsBuffers`], the primary/old/spare right-hand-side vectors
//! - [`SolveDriver`], one factor-and-solve attempt per Newton iteration with
//!   singular-pivot recovery
//! - [`adjoint_solve`], transposed solves against an existing factorization

pub mod adjoint;
pub mod dense;
pub mod driver;
pub mod error;
pub mod matrix;
pub mod rhs;

pub use adjoint::adjoint_solve;
pub use dense::DenseMatrix;
pub use driver::{LoadCallback, SolveDriver, SolveReport, SolveStats};
pub use error::{LoadError, MatrixError, MatrixResult, SolveError, SolveResult};
pub use matrix::{MatrixHandle, PivotSettings};
pub use rhs::RhsBuffers;
