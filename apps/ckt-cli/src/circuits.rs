//! Benchmark transients over the fixture RC ladder.

use ckt_config::{JobConfig, TaskConfig};
use ckt_sim::fixtures::{rc_ladder, step};
use ckt_sim::{Analysis, CircuitState, InitMode, Mode, SimContext, SimResult};
use ckt_solver::DenseMatrix;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub nodes: usize,
    pub method: String,
    pub order: usize,
    pub load_threads: usize,
    pub timepoints: usize,
    pub final_time: f64,
    pub newton_iterations: usize,
    pub factors: u64,
    pub reorders: u64,
    pub solves: u64,
    pub load_seconds: f64,
    pub factor_seconds: f64,
    pub solve_seconds: f64,
    pub voltages: Vec<f64>,
}

/// Transient of an uncharged ladder from zero up to `job`'s stop time.
///
/// Steps land exactly on breakpoints; the first step runs at order 1.
pub fn run_ladder(
    nodes: usize,
    task: TaskConfig,
    job: &JobConfig,
    order: usize,
) -> SimResult<RunSummary> {
    let mut ctx = SimContext::default();
    let task = ctx.task_config(task)?;
    let mut table = rc_ladder(nodes);
    let mut state = CircuitState::new(nodes, table.num_states(), task)?;
    let mut matrix = DenseMatrix::new(nodes);
    state.configure_job(job)?;

    state.seed_history();
    state.accept_timepoint();
    state.set_mode(Mode {
        analysis: Analysis::Tran,
        init: InitMode::Tran,
        uic: true,
    });

    let t_stop = job.t_stop.get();
    let max_step = job.effective_max_step();
    let mut timepoints = 0;
    let mut iterations = 0;
    while state.time() < t_stop - state.min_break() {
        let delta = match state.next_break() {
            Some(b) => max_step.min(b - state.time()),
            None => max_step,
        };
        iterations += step(&mut ctx, &mut state, &mut table, &mut matrix, delta)?;
        timepoints += 1;

        if timepoints == 1 && order > 1 {
            state.set_order(order)?;
        }
        state.set_mode(Mode {
            init: InitMode::Predict,
            ..state.mode()
        });
        tracing::trace!(time = state.time(), delta, "timepoint");
    }

    let stats = state.driver().stats();
    Ok(RunSummary {
        nodes,
        method: state.method().to_string(),
        order: state.order(),
        load_threads: state.load_threads(),
        timepoints,
        final_time: state.time(),
        newton_iterations: iterations,
        factors: stats.factors,
        reorders: stats.reorders,
        solves: stats.solves,
        load_seconds: ctx.load_time().total_seconds(),
        factor_seconds: stats.factor_time.total_seconds(),
        solve_seconds: stats.solve_time.total_seconds(),
        voltages: state.solution()[1..].to_vec(),
    })
}
