//! Per-circuit simulation state.

use crate::breakpoint::BreakpointSet;
use crate::coeffs::{IntegCoeffs, MAX_ORDER, check_order};
use crate::companion::{Companion, CompanionParams, Integrated};
use crate::error::{SimError, SimResult};
use crate::history::{SolutionRing, StateHistory};
use crate::predict::{self, MAX_POINTS};
use ckt_config::{IntegrationMethod, JobConfig, MAX_LOAD_THREADS, TaskConfig};
use ckt_core::ensure_positive;
use ckt_solver::{PivotSettings, RhsBuffers, SolveDriver};

/// Minimum breakpoint spacing as a fraction of the largest step, used when
/// none is configured.
const AUTO_MIN_BREAK_FRACTION: f64 = 5e-5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Analysis {
    #[default]
    DcOp,
    DcSweep,
    Ac,
    Tran,
}

/// Newton initialization phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InitMode {
    /// First iteration of an operating point: junctions start from defaults.
    #[default]
    Junction,
    /// Limited iterations before letting nonlinear devices float.
    Fix,
    /// Normal iteration.
    Float,
    /// Load small-signal parameters at the operating point.
    SmallSignal,
    /// First iteration of the first timepoint.
    Tran,
    /// First iteration of a later timepoint, starting from the predictor.
    Predict,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Mode {
    pub analysis: Analysis,
    pub init: InitMode,
    pub uic: bool,
}

/// What an unknown measures; selects its convergence floor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnknownKind {
    #[default]
    Voltage,
    Current,
}

/// Where the last failure was seen.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Trouble {
    pub node: Option<usize>,
    pub device: Option<String>,
}

/// Everything the integration and iteration layers keep per circuit.
#[derive(Debug)]
pub struct CircuitState {
    pub(crate) time: f64,
    pub(crate) delta: f64,
    pub(crate) delta_old: [f64; MAX_ORDER + 1],
    pub(crate) coeffs: IntegCoeffs,
    pred: [f64; MAX_POINTS],
    pred_count: usize,
    tran_diffs: [f64; MAX_POINTS],
    order: usize,
    method: IntegrationMethod,
    pub(crate) mode: Mode,
    pub(crate) states: StateHistory,
    pub(crate) rhs: RhsBuffers,
    sols: SolutionRing,
    pub(crate) unknown_kinds: Vec<UnknownKind>,
    load_threads: usize,
    pub(crate) noncon: usize,
    pub(crate) trouble: Option<Trouble>,
    breaks: BreakpointSet,
    min_break: f64,
    config: TaskConfig,
    pub(crate) driver: SolveDriver,
    trap_flags: usize,
}

impl CircuitState {
    /// State for `size` unknowns (ground excluded) and `num_states` state
    /// slots per generation.
    pub fn new(size: usize, num_states: usize, config: TaskConfig) -> SimResult<Self> {
        config.validate()?;
        let pivots = PivotSettings {
            rel_tol: config.pivot_rel_tol.get(),
            abs_tol: config.pivot_abs_tol.get(),
            ..PivotSettings::default()
        };
        let mut states = StateHistory::new(num_states);
        states.set_active_for_order(1);
        Ok(Self {
            time: 0.0,
            delta: 0.0,
            delta_old: [0.0; MAX_ORDER + 1],
            coeffs: IntegCoeffs::default(),
            pred: [0.0; MAX_POINTS],
            pred_count: 0,
            tran_diffs: [0.0; MAX_POINTS],
            order: 1,
            method: config.method.get(),
            mode: Mode::default(),
            states,
            rhs: RhsBuffers::new(size),
            sols: SolutionRing::new(size + 1),
            unknown_kinds: vec![UnknownKind::Voltage; size + 1],
            load_threads: config.load_threads.get(),
            noncon: 0,
            trouble: None,
            breaks: BreakpointSet::new(),
            min_break: config.min_break.get(),
            driver: SolveDriver::new(pivots),
            trap_flags: 0,
            config,
        })
    }

    /// Number of unknowns, ground excluded.
    pub fn size(&self) -> usize {
        self.rhs.size()
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn delta_old(&self) -> &[f64; MAX_ORDER + 1] {
        &self.delta_old
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn method(&self) -> IntegrationMethod {
        self.method
    }

    pub fn coeffs(&self) -> &IntegCoeffs {
        &self.coeffs
    }

    pub fn ag(&self) -> &[f64; MAX_ORDER + 1] {
        self.coeffs.ag()
    }

    /// Predictor weights and how many are meaningful.
    pub fn pred(&self) -> (&[f64; MAX_POINTS], usize) {
        (&self.pred, self.pred_count)
    }

    /// Weights used by the last [`CircuitState::interpolate`].
    pub fn tran_diffs(&self) -> &[f64; MAX_POINTS] {
        &self.tran_diffs
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn states(&self) -> &StateHistory {
        &self.states
    }

    pub fn states_mut(&mut self) -> &mut StateHistory {
        &mut self.states
    }

    pub fn rhs(&self) -> &RhsBuffers {
        &self.rhs
    }

    pub fn rhs_mut(&mut self) -> &mut RhsBuffers {
        &mut self.rhs
    }

    /// The latest solution, indexed by unknown (0 is ground).
    pub fn solution(&self) -> &[f64] {
        self.rhs.solution()
    }

    pub fn solutions(&self) -> &SolutionRing {
        &self.sols
    }

    pub fn unknown_kinds(&self) -> &[UnknownKind] {
        &self.unknown_kinds
    }

    pub fn set_unknown_kind(&mut self, unknown: usize, kind: UnknownKind) -> SimResult<()> {
        let slot = self
            .unknown_kinds
            .get_mut(unknown)
            .ok_or(SimError::InvalidArg {
                what: "unknown index out of range",
            })?;
        *slot = kind;
        Ok(())
    }

    pub fn load_threads(&self) -> usize {
        self.load_threads
    }

    pub fn set_load_threads(&mut self, threads: usize) -> SimResult<()> {
        if threads > MAX_LOAD_THREADS {
            return Err(SimError::InvalidArg {
                what: "load thread count exceeds the limit",
            });
        }
        self.load_threads = threads;
        Ok(())
    }

    /// Newton iteration budget for the current analysis.
    pub fn iteration_limit(&self) -> usize {
        match self.mode.analysis {
            Analysis::Tran => self.config.tran_max_iter.get(),
            _ => self.config.dc_max_iter.get(),
        }
    }

    /// Nonconvergence count from the last Newton iteration.
    pub fn noncon(&self) -> usize {
        self.noncon
    }

    pub fn trouble(&self) -> Option<&Trouble> {
        self.trouble.as_ref()
    }

    pub fn driver(&self) -> &SolveDriver {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut SolveDriver {
        &mut self.driver
    }

    /// Integrations that reported trapezoidal ringing so far.
    pub fn trap_flags(&self) -> usize {
        self.trap_flags
    }

    pub fn set_method(&mut self, method: IntegrationMethod) {
        if method != self.method {
            self.method = method;
            self.order = self.order.min(method.max_order());
            self.states.set_active_for_order(self.order);
            self.coeffs.mark_stale();
        }
    }

    /// Select the method by its parameter name (`trap` or `gear`).
    pub fn set_method_by_name(&mut self, name: &str) -> SimResult<()> {
        let method: IntegrationMethod = name.parse()?;
        self.set_method(method);
        Ok(())
    }

    /// Change the integration order, bounded by the method and `maxord`.
    pub fn set_order(&mut self, order: usize) -> SimResult<()> {
        check_order(self.method, order)?;
        let max = self.config.effective_max_order();
        if order > max {
            return Err(SimError::Order {
                order,
                max,
                method: self.method,
            });
        }
        if order != self.order {
            self.order = order;
            self.states.set_active_for_order(order);
            self.coeffs.mark_stale();
        }
        Ok(())
    }

    /// Set the step being attempted without moving time.
    pub fn set_delta(&mut self, delta: f64) -> SimResult<()> {
        ensure_positive(delta, "delta")?;
        self.delta = delta;
        self.delta_old[0] = delta;
        self.coeffs.mark_stale();
        Ok(())
    }

    /// Move time forward by `delta`.
    pub fn advance(&mut self, delta: f64) -> SimResult<()> {
        self.set_delta(delta)?;
        self.time += delta;
        Ok(())
    }

    /// Undo the last [`CircuitState::advance`] after a rejected step.
    pub fn retract(&mut self) {
        self.time -= self.delta;
    }

    /// Recompute `ag[]` and the predictor weights for the current step.
    ///
    /// Nothing is committed unless both succeed.
    pub fn compute_coefficients(&mut self) -> SimResult<()> {
        let pred = if self.sols.is_empty() {
            None
        } else {
            Some(predict::predictor_weights(
                self.order,
                &self.delta_old,
                self.sols.len(),
            )?)
        };
        let xmu = self.config.xmu.get();
        self.coeffs
            .compute(self.method, self.order, xmu, self.delta, &self.delta_old)?;
        if let Some((pred, count)) = pred {
            self.pred = pred;
            self.pred_count = count;
        }
        Ok(())
    }

    pub(crate) fn companion_params(&self) -> CompanionParams {
        CompanionParams {
            delta: self.delta,
            trap_ratio: self.config.trap_ratio.get(),
            trap_check: self.config.trap_check.get(),
        }
    }

    /// Whole-circuit companion view over generation 0.
    pub fn companion(&mut self) -> Companion<'_> {
        let params = self.companion_params();
        let (current, older) = self.states.split_current();
        Companion::new(&self.coeffs, params, 0, current, older)
    }

    pub fn find_ceq(&mut self, q: usize) -> SimResult<f64> {
        self.companion().find_ceq(q)
    }

    pub fn integrate(&mut self, cap: f64, q: usize) -> SimResult<Integrated> {
        let out = self.companion().integrate(cap, q)?;
        if out.oscillating {
            self.trap_flags += 1;
        }
        Ok(out)
    }

    pub fn trap_check(&mut self, q: usize) -> SimResult<bool> {
        self.companion().trap_check(q)
    }

    /// Seed `rhs_old` with the predicted solution at the current time.
    pub fn predict(&mut self) -> SimResult<()> {
        let (weights, count) =
            predict::predictor_weights(self.order, &self.delta_old, self.sols.len())?;
        self.pred = weights;
        self.pred_count = count;
        predict::combine(&self.sols, &weights[..count], &mut self.rhs.rhs_old);
        Ok(())
    }

    /// Solution at `t` interpolated from the newest accepted timepoints.
    pub fn interpolate(&mut self, t: f64) -> SimResult<Vec<f64>> {
        let (weights, count) = predict::interpolation_weights(&self.sols, t)?;
        self.tran_diffs = weights;
        let mut out = vec![0.0; self.size() + 1];
        predict::combine(&self.sols, &weights[..count], &mut out);
        Ok(out)
    }

    /// Accept the solved timepoint: record the solution, rotate state
    /// generations and shift the step history.
    pub fn accept_timepoint(&mut self) {
        self.sols.push(self.time, &self.rhs.rhs_old);
        self.states.rotate();
        self.delta_old.copy_within(0..MAX_ORDER, 1);
        self.coeffs.mark_stale();
        self.breaks.clear_break(self.time, self.min_break);
        tracing::trace!(time = self.time, delta = self.delta, "timepoint accepted");
    }

    /// Copy generation 0 into every older generation, for the initial
    /// timepoint.
    pub fn seed_history(&mut self) {
        self.states.fill_history();
    }

    pub fn min_break(&self) -> f64 {
        self.min_break
    }

    pub fn breakpoints(&self) -> &BreakpointSet {
        &self.breaks
    }

    pub fn set_break(&mut self, time: f64) -> SimResult<bool> {
        self.breaks.set_break(time, self.time, self.min_break)
    }

    pub fn set_lattice(&mut self, offset: f64, period: f64) -> SimResult<bool> {
        self.breaks.set_lattice(offset, period)
    }

    pub fn clear_break(&mut self) {
        self.breaks.clear_break(self.time, self.min_break);
    }

    pub fn next_break(&self) -> Option<f64> {
        self.breaks.next_break(self.time, self.min_break)
    }

    /// Bind a transient job: validate it, derive `min_break` when not
    /// configured, and force a breakpoint at the stop time.
    pub fn configure_job(&mut self, job: &JobConfig) -> SimResult<()> {
        job.validate()?;
        if !self.config.min_break.is_given() || self.min_break <= 0.0 {
            self.min_break = job.effective_max_step() * AUTO_MIN_BREAK_FRACTION;
        }
        self.mode.uic = job.uic.get();
        self.set_break(job.t_stop.get())?;
        tracing::debug!(
            t_stop = job.t_stop.get(),
            min_break = self.min_break,
            "transient job configured"
        );
        Ok(())
    }

    pub(crate) fn record_trouble(&mut self, trouble: Trouble) {
        tracing::debug!(node = ?trouble.node, device = ?trouble.device, "trouble recorded");
        self.trouble = Some(trouble);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ckt_config::ParamValue;

    fn state() -> CircuitState {
        CircuitState::new(2, 4, TaskConfig::default()).unwrap()
    }

    #[test]
    fn delta_or_order_change_marks_stale() {
        let mut s = state();
        s.advance(1e-9).unwrap();
        s.compute_coefficients().unwrap();
        assert!(!s.coeffs().is_stale());

        s.set_order(2).unwrap();
        assert!(s.coeffs().is_stale());
        assert!(matches!(s.find_ceq(0), Err(SimError::CoeffsStale)));

        s.compute_coefficients().unwrap();
        assert!((s.ag()[0] - 2e9).abs() < 1e-3);
        s.set_delta(2e-9).unwrap();
        assert!(matches!(s.integrate(1.0, 0), Err(SimError::CoeffsStale)));
    }

    #[test]
    fn failed_predictor_leaves_coefficients_stale() {
        let mut s = state();
        for _ in 0..2 {
            s.advance(1e-9).unwrap();
            s.accept_timepoint();
        }
        s.advance(1e-9).unwrap();
        s.compute_coefficients().unwrap();
        let ag = *s.ag();
        let pred = *s.pred().0;

        s.advance(2e-9).unwrap();
        s.delta_old[1] = 0.0;
        let err = s.compute_coefficients().unwrap_err();
        assert!(matches!(err, SimError::Core(_)));
        assert!(s.coeffs().is_stale());
        assert_eq!(*s.ag(), ag);
        assert_eq!(*s.pred().0, pred);
    }

    #[test]
    fn integrate_counts_trap_flags() {
        let mut cfg = TaskConfig::default();
        cfg.set_param_by_name("trapcheck", ParamValue::Bool(true))
            .unwrap();
        let mut s = CircuitState::new(2, 4, cfg).unwrap();
        // charge flat at 1e-12, capacitor current alternating in sign
        for c in [-1.0, 1.0] {
            s.states_mut().current_mut()[..2].copy_from_slice(&[1e-12, c]);
            s.states_mut().rotate();
        }
        s.set_order(2).unwrap();
        s.advance(1e-9).unwrap();
        s.compute_coefficients().unwrap();

        let out = s.integrate(1e-6, 0).unwrap();
        assert!(out.oscillating);
        assert_eq!(s.trap_flags(), 1);

        s.set_order(1).unwrap();
        s.compute_coefficients().unwrap();
        assert!(!s.integrate(1e-6, 0).unwrap().oscillating);
        assert_eq!(s.trap_flags(), 1);
    }

    #[test]
    fn order_bounded_by_method_and_maxord() {
        let mut s = state();
        assert!(matches!(s.set_order(3), Err(SimError::Order { .. })));
        assert!(s.set_order(0).is_err());

        let mut cfg = TaskConfig::default();
        cfg.set_param_by_name("method", ParamValue::Text("gear".into()))
            .unwrap();
        cfg.set_param_by_name("maxord", ParamValue::Int(6)).unwrap();
        let mut s = CircuitState::new(1, 2, cfg).unwrap();
        s.set_order(6).unwrap();
        assert_eq!(s.states().active(), 8);
        assert!(s.set_order(7).is_err());

        // switching back to trapezoidal clamps the order
        s.set_method(IntegrationMethod::Trapezoidal);
        assert_eq!(s.order(), 2);
    }

    #[test]
    fn unknown_method_name() {
        let mut s = state();
        let err = s.set_method_by_name("euler").unwrap_err();
        assert!(matches!(err, SimError::Method { .. }));
        s.set_method_by_name("gear").unwrap();
        assert_eq!(s.method(), IntegrationMethod::Gear);
    }

    #[test]
    fn accept_shifts_history() {
        let mut s = state();
        s.advance(1.0).unwrap();
        s.states_mut().current_mut()[0] = 7.0;
        s.rhs_mut().rhs_old[1] = 3.0;
        s.accept_timepoint();
        s.advance(2.0).unwrap();

        assert_eq!(s.delta_old()[0], 2.0);
        assert_eq!(s.delta_old()[1], 1.0);
        assert_eq!(s.states().generation(1).unwrap()[0], 7.0);
        assert_eq!(s.solutions().get(0).unwrap().1[1], 3.0);
        assert_eq!(s.time(), 3.0);
        s.retract();
        assert_eq!(s.time(), 1.0);
    }

    #[test]
    fn job_sets_stop_breakpoint_and_min_break() {
        let mut s = state();
        let job = JobConfig::new(1e-6, 1e-3).unwrap();
        s.configure_job(&job).unwrap();
        assert_eq!(s.breakpoints().explicit(), &[1e-3]);
        assert!(s.min_break() > 0.0);
        assert!(matches!(
            s.set_break(-1.0),
            Err(SimError::BreakpointInPast { .. })
        ));
    }

    #[test]
    fn thread_limit() {
        let mut s = state();
        assert!(s.set_load_threads(MAX_LOAD_THREADS).is_ok());
        assert!(s.set_load_threads(MAX_LOAD_THREADS + 1).is_err());
    }
}
