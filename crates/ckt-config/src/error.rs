//! Error types for configuration handling.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown parameter: {name}")]
    UnknownParam { name: String },

    #[error("Value out of range for {name}: {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("Wrong value kind for {name}: expected {expected}")]
    WrongKind {
        name: &'static str,
        expected: &'static str,
    },

    #[error("Unsupported integration method: {name}")]
    Method { name: String },

    #[error("Invalid job: {what}")]
    InvalidJob { what: &'static str },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
