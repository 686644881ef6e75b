//! Newton iteration over device loads and the sparse solve driver.

use crate::context::SimContext;
use crate::device::Device;
use crate::error::{SimError, SimResult};
use crate::load::{CircuitLoader, DeviceTable, LoadInputs};
use crate::state::{CircuitState, InitMode, Trouble, UnknownKind};
use ckt_solver::{LoadCallback, MatrixHandle, SolveError};

/// Newton iteration result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewtonOutcome {
    /// Loads and solves performed
    pub iterations: usize,
    /// A full reorder ran during the iteration
    pub reordered: bool,
}

/// Iterate load, factor and solve until the solution settles.
///
/// The initialization mode in `state` drives the first iterations
/// (junction, fix, tran, predict) and ends in float mode. Convergence needs
/// two consecutive iterates within tolerance and no device reporting
/// nonconvergence. Returns [`SimError::NonConvergence`] once `max_iter`
/// iterations ran without converging.
pub fn ni_iter<D: Device>(
    ctx: &mut SimContext,
    state: &mut CircuitState,
    table: &mut DeviceTable<D>,
    matrix: &mut dyn MatrixHandle,
    max_iter: usize,
) -> SimResult<NewtonOutcome> {
    if max_iter == 0 {
        return Err(SimError::InvalidArg {
            what: "iteration limit must be positive",
        });
    }
    ctx.ensure_pool(state.load_threads())?;
    if state.states.len() < table.num_states() {
        state.states.resize(table.num_states());
    }
    if state.mode.init == InitMode::Predict && !state.solutions().is_empty() {
        state.predict()?;
    }

    let mut outcome = NewtonOutcome {
        iterations: 0,
        reordered: false,
    };
    loop {
        state.noncon = 0;
        let inputs = LoadInputs {
            params: state.companion_params(),
            mode: state.mode,
            time: state.time,
            gmin: state.config().gmin.get(),
        };

        let mut loader = CircuitLoader::new(table, &mut state.states, &state.coeffs, inputs)
            .with_pool(ctx.pool(), ctx.pool_threads())
            .with_timer(ctx.load_time());
        matrix.clear();
        state.rhs.clear_rhs();
        let solved = loader
            .load(matrix, &mut state.rhs)
            .map_err(SolveError::from)
            .and_then(|()| state.driver.solve(matrix, &mut state.rhs, &mut loader));
        let device_noncon = loader.noncon();
        let failed_device = loader.take_failed_device();
        drop(loader);

        let report = match solved {
            Ok(report) => report,
            Err(SolveError::Load(source)) if failed_device.is_some() => {
                let device = failed_device.unwrap_or_default();
                state.record_trouble(Trouble {
                    node: None,
                    device: Some(device.clone()),
                });
                return Err(SimError::Device { device, source });
            }
            Err(e) => {
                tracing::debug!(error = %e, iteration = outcome.iterations, "solve failed");
                return Err(e.into());
            }
        };
        outcome.iterations += 1;
        outcome.reordered |= report.reordered;

        state.noncon = if device_noncon == 0 && outcome.iterations > 1 {
            conv_test(state)
        } else {
            1
        };
        tracing::trace!(
            iteration = outcome.iterations,
            noncon = state.noncon,
            init = ?state.mode.init,
            "newton iteration"
        );

        match state.mode.init {
            InitMode::Float => {
                if state.noncon == 0 {
                    return Ok(outcome);
                }
            }
            InitMode::Junction => state.mode.init = InitMode::Fix,
            InitMode::Fix => {
                if state.noncon == 0 {
                    state.mode.init = InitMode::Float;
                }
            }
            InitMode::Tran => {
                if outcome.iterations <= 1 {
                    state.driver.request_reorder();
                }
                state.mode.init = InitMode::Float;
            }
            InitMode::SmallSignal | InitMode::Predict => state.mode.init = InitMode::Float,
        }

        if outcome.iterations >= max_iter {
            tracing::debug!(iterations = outcome.iterations, "newton iteration limit reached");
            return Err(SimError::NonConvergence {
                iterations: outcome.iterations,
            });
        }
    }
}

/// Compare the new iterate (`rhs_old`) against the previous one (`rhs`).
///
/// Returns 0 when every unknown is within tolerance, 1 otherwise, and
/// records the first offending unknown.
fn conv_test(state: &mut CircuitState) -> usize {
    let cfg = state.config();
    let rel_tol = cfg.rel_tol.get();
    let vn_tol = cfg.vn_tol.get();
    let abs_tol = cfg.abs_tol.get();

    let failed = (1..=state.size()).find(|&i| {
        let new = state.rhs.rhs_old[i];
        let old = state.rhs.rhs[i];
        if !new.is_finite() {
            return true;
        }
        let floor = match state.unknown_kinds[i] {
            UnknownKind::Voltage => vn_tol,
            UnknownKind::Current => abs_tol,
        };
        (new - old).abs() > rel_tol * new.abs().max(old.abs()) + floor
    });

    match failed {
        Some(node) => {
            state.record_trouble(Trouble {
                node: Some(node),
                device: None,
            });
            1
        }
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::companion::Companion;
    use crate::device::{DeviceContext, EntryId, MatrixPattern, StampSink, StateAllocator};
    use crate::state::Mode;
    use ckt_config::TaskConfig;
    use ckt_solver::{DenseMatrix, LoadError};

    /// Diode-like element: current `g * v^2` into ground, linearized.
    struct Square {
        node: usize,
        g: f64,
        entry: Option<EntryId>,
    }

    impl Device for Square {
        fn name(&self) -> &str {
            "square"
        }

        fn setup(&mut self, pattern: &mut MatrixPattern, _states: &mut StateAllocator) {
            self.entry = pattern.entry(self.node, self.node);
        }

        fn load(
            &self,
            ctx: &DeviceContext<'_>,
            _companion: &mut Companion<'_>,
            sink: &StampSink<'_>,
        ) -> Result<(), LoadError> {
            let v = ctx.voltage(self.node);
            let gd = 2.0 * self.g * v.abs().max(1e-3);
            let id = self.g * v * v.abs();
            sink.add_matrix(self.entry, gd);
            sink.add_rhs(self.node, gd * v - id);
            Ok(())
        }
    }

    /// Fixed current into a node.
    struct Source {
        node: usize,
        amps: f64,
    }

    impl Device for Source {
        fn name(&self) -> &str {
            "source"
        }

        fn setup(&mut self, _pattern: &mut MatrixPattern, _states: &mut StateAllocator) {}

        fn load(
            &self,
            _ctx: &DeviceContext<'_>,
            _companion: &mut Companion<'_>,
            sink: &StampSink<'_>,
        ) -> Result<(), LoadError> {
            sink.add_rhs(self.node, self.amps);
            Ok(())
        }
    }

    enum Part {
        Square(Square),
        Source(Source),
    }

    impl Device for Part {
        fn name(&self) -> &str {
            match self {
                Part::Square(d) => d.name(),
                Part::Source(d) => d.name(),
            }
        }

        fn setup(&mut self, pattern: &mut MatrixPattern, states: &mut StateAllocator) {
            match self {
                Part::Square(d) => d.setup(pattern, states),
                Part::Source(d) => d.setup(pattern, states),
            }
        }

        fn load(
            &self,
            ctx: &DeviceContext<'_>,
            companion: &mut Companion<'_>,
            sink: &StampSink<'_>,
        ) -> Result<(), LoadError> {
            match self {
                Part::Square(d) => d.load(ctx, companion, sink),
                Part::Source(d) => d.load(ctx, companion, sink),
            }
        }
    }

    fn circuit() -> DeviceTable<Part> {
        DeviceTable::setup(
            vec![
                Part::Square(Square {
                    node: 1,
                    g: 1.0,
                    entry: None,
                }),
                Part::Source(Source { node: 1, amps: 4.0 }),
            ],
            1,
        )
    }

    #[test]
    fn nonlinear_circuit_converges() {
        let mut ctx = SimContext::default();
        let mut state = CircuitState::new(1, 0, TaskConfig::default()).unwrap();
        state.set_mode(Mode {
            init: InitMode::Junction,
            ..Mode::default()
        });
        state.rhs_mut().rhs_old[1] = 1.0;
        let mut table = circuit();
        let mut m = DenseMatrix::new(1);

        let out = ni_iter(&mut ctx, &mut state, &mut table, &mut m, 100).unwrap();
        assert!((state.solution()[1] - 2.0).abs() < 1e-5);
        assert!(out.iterations > 2);
        assert!(out.reordered);
        assert_eq!(state.mode().init, InitMode::Float);
        assert!(ctx.load_time().count() >= out.iterations as u64);
    }

    #[test]
    fn iteration_budget_is_enforced() {
        let mut ctx = SimContext::default();
        let mut state = CircuitState::new(1, 0, TaskConfig::default()).unwrap();
        state.set_mode(Mode {
            init: InitMode::Float,
            ..Mode::default()
        });
        state.rhs_mut().rhs_old[1] = 100.0;
        let mut table = circuit();
        let mut m = DenseMatrix::new(1);

        let err = ni_iter(&mut ctx, &mut state, &mut table, &mut m, 3).unwrap_err();
        assert!(matches!(err, SimError::NonConvergence { iterations: 3 }));
        assert_eq!(state.trouble().and_then(|t| t.node), Some(1));
    }

    #[test]
    fn zero_budget_rejected() {
        let mut ctx = SimContext::default();
        let mut state = CircuitState::new(1, 0, TaskConfig::default()).unwrap();
        let mut table = circuit();
        let mut m = DenseMatrix::new(1);
        assert!(ni_iter(&mut ctx, &mut state, &mut table, &mut m, 0).is_err());
    }
}
