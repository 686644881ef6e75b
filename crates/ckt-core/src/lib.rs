//! ckt-core: shared foundation for the circuit engine crates.
//!
//! Contains:
//! - numeric (Real, the ground index, scalar input checks)
//! - accumulate (thread-safe float accumulation for parallel loads)
//! - stats (accumulating timers and solver counters)
//! - error (shared error types)

pub mod accumulate;
pub mod error;
pub mod numeric;
pub mod stats;

pub use accumulate::{SharedAccumulator, atomic_add};
pub use error::{CoreError, CoreResult};
pub use numeric::*;
pub use stats::{AccumulatingTimer, Timer};
