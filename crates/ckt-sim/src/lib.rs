//! Time-step integration and nonlinear iteration core.
//!
//! Provides:
//! - Breakpoint scheduling with lazily generated periodic lattices
//! - Trapezoidal and variable-order Gear integration coefficients
//! - Companion-model charge integration and the trapezoidal ringing check
//! - Solution predictor and output interpolation
//! - The circuit state container (step history, state generations, RHS)
//! - Threaded device loading and Newton iteration over the solve driver
//! - Linear fixture elements (`fixtures` feature)

pub mod breakpoint;
pub mod coeffs;
pub mod companion;
pub mod context;
pub mod device;
pub mod error;
#[cfg(feature = "fixtures")]
pub mod fixtures;
pub mod history;
pub mod load;
pub mod newton;
pub mod predict;
pub mod state;

pub use breakpoint::{BreakpointSet, Lattice};
pub use ckt_config::IntegrationMethod;
pub use coeffs::{IntegCoeffs, MAX_ORDER};
pub use companion::{Companion, CompanionParams, Integrated};
pub use context::SimContext;
pub use device::{Device, DeviceContext, EntryId, MatrixPattern, StampSink, StateAllocator};
pub use error::{INTEGRATION_ERROR, LOADER_ERROR, SimError, SimResult};
pub use history::{NUM_STATES, SolutionRing, StateHistory};
pub use load::{CircuitLoader, DeviceTable, LoadInputs};
pub use newton::{NewtonOutcome, ni_iter};
pub use state::{Analysis, CircuitState, InitMode, Mode, Trouble, UnknownKind};
