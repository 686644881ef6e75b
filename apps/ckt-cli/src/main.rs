mod circuits;

use ckt_config::{ConfigError, JobConfig, ParamId, ParamKind, ParamValue, TaskConfig};
use ckt_sim::SimError;
use clap::{Parser, Subcommand};
use std::ops::Bound;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Sim(#[from] SimError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Bad option {arg}: expected NAME=VALUE")]
    Option { arg: String },
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "ckt-cli")]
#[command(about = "Circuit simulation core - benchmark and parameter tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the task parameter table with defaults and ranges
    Params,
    /// Run a transient on the built-in RC ladder
    Ladder {
        /// Number of ladder nodes
        #[arg(long, default_value_t = 32)]
        nodes: usize,
        /// Time step in seconds
        #[arg(long, default_value_t = 1e-7)]
        step: f64,
        /// Stop time in seconds
        #[arg(long, default_value_t = 1e-5)]
        stop: f64,
        /// Integration order after the first step
        #[arg(long, default_value_t = 2)]
        order: usize,
        /// Task parameter override, e.g. `-o method=gear -o loadthrds=4`
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Params => cmd_params(),
        Commands::Ladder {
            nodes,
            step,
            stop,
            order,
            options,
            json,
        } => cmd_ladder(nodes, step, stop, order, &options, json),
    }
}

fn format_bound(b: Bound<&f64>) -> String {
    match b {
        Bound::Included(v) => format!("[{v}"),
        Bound::Excluded(v) => format!("({v}"),
        Bound::Unbounded => "(-inf".to_string(),
    }
}

fn format_upper(b: Bound<&f64>) -> String {
    match b {
        Bound::Included(v) => format!("{v}]"),
        Bound::Excluded(v) => format!("{v})"),
        Bound::Unbounded => "inf)".to_string(),
    }
}

fn cmd_params() -> CliResult<()> {
    let defaults = TaskConfig::default();
    println!("{:<12} {:<8} {:<14} range", "name", "kind", "default");
    for id in ParamId::ALL {
        let range = match id.range() {
            Some((lo, hi)) => format!("{}, {}", format_bound(lo.as_ref()), format_upper(hi.as_ref())),
            None => "-".to_string(),
        };
        println!(
            "{:<12} {:<8} {:<14} {}",
            id.name(),
            format!("{:?}", id.kind()).to_lowercase(),
            defaults.param(id).to_string(),
            range
        );
    }
    Ok(())
}

/// Parse `NAME=VALUE`, guessing the value type from the parameter kind.
fn apply_option(task: &mut TaskConfig, arg: &str) -> CliResult<()> {
    let (name, raw) = arg.split_once('=').ok_or_else(|| CliError::Option {
        arg: arg.to_string(),
    })?;
    let id: ParamId = name.trim().parse()?;
    let raw = raw.trim();
    let bad = || CliError::Option {
        arg: arg.to_string(),
    };
    let value = match id.kind() {
        ParamKind::Real => ParamValue::Real(raw.parse().map_err(|_| bad())?),
        ParamKind::Int => ParamValue::Int(raw.parse().map_err(|_| bad())?),
        ParamKind::Bool => ParamValue::Bool(raw.parse().map_err(|_| bad())?),
        ParamKind::Method => ParamValue::Text(raw.to_string()),
    };
    task.set_param(id, value)?;
    Ok(())
}

fn cmd_ladder(
    nodes: usize,
    step: f64,
    stop: f64,
    order: usize,
    options: &[String],
    json: bool,
) -> CliResult<()> {
    let mut task = TaskConfig::default();
    for arg in options {
        apply_option(&mut task, arg)?;
    }
    let job = JobConfig::new(step, stop)?;

    tracing::info!(nodes, step, stop, order, "running RC ladder");
    let summary = circuits::run_ladder(nodes, task, &job, order)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("=== RC ladder ({} nodes) ===", summary.nodes);
    println!(
        "Method: {} order {}, load threads {}",
        summary.method, summary.order, summary.load_threads
    );
    println!(
        "Timepoints: {}  Newton iterations: {}  final time: {:.6e} s",
        summary.timepoints, summary.newton_iterations, summary.final_time
    );
    println!(
        "Factors: {}  reorders: {}  solves: {}",
        summary.factors, summary.reorders, summary.solves
    );
    println!(
        "Time: load {:.3} ms, factor {:.3} ms, solve {:.3} ms",
        summary.load_seconds * 1e3,
        summary.factor_seconds * 1e3,
        summary.solve_seconds * 1e3
    );
    for (n, v) in summary.voltages.iter().enumerate().take(8) {
        println!("  v({}) = {:.6e}", n + 1, v);
    }
    if summary.voltages.len() > 8 {
        println!("  ... {} more nodes", summary.voltages.len() - 8);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_are_typed_by_kind() {
        let mut task = TaskConfig::default();
        apply_option(&mut task, "method=gear").unwrap();
        apply_option(&mut task, "maxord=4").unwrap();
        apply_option(&mut task, "reltol=1e-4").unwrap();
        apply_option(&mut task, "trapcheck=true").unwrap();
        assert_eq!(task.max_order.get(), 4);
        assert!(task.trap_check.get());
        assert!(task.rel_tol.is_given());
    }

    #[test]
    fn malformed_options_rejected() {
        let mut task = TaskConfig::default();
        assert!(matches!(
            apply_option(&mut task, "reltol"),
            Err(CliError::Option { .. })
        ));
        assert!(matches!(
            apply_option(&mut task, "maxord=two"),
            Err(CliError::Option { .. })
        ));
        assert!(matches!(
            apply_option(&mut task, "bogus=1"),
            Err(CliError::Config(_))
        ));
    }
}
