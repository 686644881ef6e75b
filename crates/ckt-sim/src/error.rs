//! Error types for integration and iteration.

use ckt_config::{ConfigError, IntegrationMethod};
use ckt_core::CoreError;
use ckt_solver::{LoadError, SolveError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Integration order {order} outside 1..={max} for {method}")]
    Order {
        order: usize,
        max: usize,
        method: IntegrationMethod,
    },

    #[error("Unsupported integration method: {name}")]
    Method { name: String },

    #[error("Invalid step: {what}")]
    InvalidStep { what: &'static str },

    #[error("Integration coefficients are stale; recompute after changing delta or order")]
    CoeffsStale,

    #[error("Breakpoint {time} is earlier than current time {now}")]
    BreakpointInPast { time: f64, now: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Device {device} failed: {source}")]
    Device {
        device: String,
        #[source]
        source: LoadError,
    },

    #[error("No convergence after {iterations} iterations")]
    NonConvergence { iterations: usize },

    #[error("Thread pool error: {message}")]
    ThreadPool { message: String },

    #[error("Solve error: {0}")]
    Solve(#[from] SolveError),

    #[error("Config error: {0}")]
    Config(ConfigError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

pub type SimResult<T> = Result<T, SimError>;

/// [`LoadError`] code for failures raised by the loader itself.
pub const LOADER_ERROR: i32 = -1;
/// [`LoadError`] code for integration errors hit inside a device load.
pub const INTEGRATION_ERROR: i32 = -2;

impl From<ConfigError> for SimError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Method { name } => SimError::Method { name },
            other => SimError::Config(other),
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for SimError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        SimError::ThreadPool {
            message: e.to_string(),
        }
    }
}

impl From<SimError> for LoadError {
    fn from(e: SimError) -> Self {
        LoadError::new(INTEGRATION_ERROR, e.to_string())
    }
}
