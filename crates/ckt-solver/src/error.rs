//! Error types for the linear solve layer.

use thiserror::Error;

/// Failures reported by a [`crate::MatrixHandle`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatrixError {
    /// No acceptable pivot at the current elimination order.
    #[error("singular matrix (row {row})")]
    Singular { row: usize },

    #[error("out of memory while factoring")]
    NoMemory,

    #[error("bad matrix: {what}")]
    BadMatrix { what: &'static str },

    #[error("solve requested before a successful factor")]
    NotFactored,

    #[error("vector length mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("index {index} outside matrix of size {size}")]
    BadIndex { index: usize, size: usize },
}

pub type MatrixResult<T> = Result<T, MatrixError>;

/// Error code returned by a device-load callback.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("load failed (code {code}): {message}")]
pub struct LoadError {
    pub code: i32,
    pub message: String,
}

impl LoadError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors surfaced by the solve driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("Matrix error: {0}")]
    Matrix(#[from] MatrixError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Adjoint drive needs two distinct nodes, got {node} twice")]
    SameDriveNodes { node: usize },
}

impl SolveError {
    pub fn is_singular(&self) -> bool {
        matches!(self, SolveError::Matrix(MatrixError::Singular { .. }))
    }
}

pub type SolveResult<T> = Result<T, SolveError>;
