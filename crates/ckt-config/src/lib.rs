//! Task and job configuration for the circuit engine.
//!
//! Every field is a [`Setting`]: a value plus a flag recording whether the
//! user gave it explicitly. Shell-level options merge into a task according
//! to a [`MergePolicy`]; the merge never overrides a field the task gave.

pub mod error;
pub mod job;
pub mod method;
pub mod params;
pub mod setting;
pub mod task;

pub use error::{ConfigError, ConfigResult};
pub use job::JobConfig;
pub use method::IntegrationMethod;
pub use params::{ParamId, ParamKind, ParamValue};
pub use setting::{MergePolicy, Setting};
pub use task::{MAX_LOAD_THREADS, MAX_LOOP_THREADS, TaskConfig};
