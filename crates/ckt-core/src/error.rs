use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Rejected scalar inputs: step sizes, breakpoint times, lattice periods.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("{what} must be finite, got {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("{what} must be positive, got {value}")]
    NotPositive { what: &'static str, value: f64 },
}
