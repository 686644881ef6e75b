//! Per-task analysis options.

use crate::method::IntegrationMethod;
use crate::params::ParamId;
use crate::setting::{MergePolicy, Setting};
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};

/// Upper bound on device-load worker threads.
pub const MAX_LOAD_THREADS: usize = 31;
/// Upper bound on analysis-loop worker threads.
pub const MAX_LOOP_THREADS: usize = 31;

/// Tolerances, iteration limits and method selection for one analysis task.
///
/// The same type doubles as the shell-level option set that tasks inherit
/// from (see [`TaskConfig::merge_shell`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Absolute current tolerance (A).
    pub abs_tol: Setting<f64>,
    /// Relative tolerance.
    pub rel_tol: Setting<f64>,
    /// Absolute voltage tolerance (V).
    pub vn_tol: Setting<f64>,
    /// Absolute charge tolerance (C).
    pub chg_tol: Setting<f64>,
    /// Truncation error overestimate factor.
    pub tr_tol: Setting<f64>,
    /// Relative pivot threshold for reordering.
    pub pivot_rel_tol: Setting<f64>,
    /// Absolute pivot threshold.
    pub pivot_abs_tol: Setting<f64>,
    /// Minimum conductance added across junctions.
    pub gmin: Setting<f64>,
    /// Trapezoidal damping, 0 gives backward Euler and 0.5 pure trapezoidal.
    pub xmu: Setting<f64>,
    /// Oscillation detector sensitivity.
    pub trap_ratio: Setting<f64>,
    /// Breakpoint merge distance; 0 selects an automatic value.
    pub min_break: Setting<f64>,
    /// Newton iteration limit for DC operating point.
    pub dc_max_iter: Setting<usize>,
    /// Newton iteration limit per transient timepoint.
    pub tran_max_iter: Setting<usize>,
    /// Highest integration order the stepper may use.
    pub max_order: Setting<usize>,
    pub method: Setting<IntegrationMethod>,
    /// Device-load worker threads (0 = serial).
    pub load_threads: Setting<usize>,
    /// Analysis-loop worker threads (0 = serial).
    pub loop_threads: Setting<usize>,
    /// Run the trapezoidal oscillation check during integration.
    pub trap_check: Setting<bool>,
    /// Operating temperature (C).
    pub temperature: Setting<f64>,
    /// Nominal model temperature (C).
    pub nominal_temperature: Setting<f64>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            abs_tol: Setting::default_to(1e-12),
            rel_tol: Setting::default_to(1e-3),
            vn_tol: Setting::default_to(1e-6),
            chg_tol: Setting::default_to(1e-14),
            tr_tol: Setting::default_to(7.0),
            pivot_rel_tol: Setting::default_to(1e-3),
            pivot_abs_tol: Setting::default_to(1e-13),
            gmin: Setting::default_to(1e-12),
            xmu: Setting::default_to(0.5),
            trap_ratio: Setting::default_to(10.0),
            min_break: Setting::default_to(0.0),
            dc_max_iter: Setting::default_to(100),
            tran_max_iter: Setting::default_to(10),
            max_order: Setting::default_to(2),
            method: Setting::default_to(IntegrationMethod::Trapezoidal),
            load_threads: Setting::default_to(0),
            loop_threads: Setting::default_to(0),
            trap_check: Setting::default_to(false),
            temperature: Setting::default_to(27.0),
            nominal_temperature: Setting::default_to(27.0),
        }
    }
}

impl TaskConfig {
    /// Merge shell-level options into this task under `policy`.
    ///
    /// Returns the number of fields whose value was taken from the shell.
    pub fn merge_shell(&mut self, shell: &TaskConfig, policy: MergePolicy) -> usize {
        let merged = [
            self.abs_tol.inherit(&shell.abs_tol, policy),
            self.rel_tol.inherit(&shell.rel_tol, policy),
            self.vn_tol.inherit(&shell.vn_tol, policy),
            self.chg_tol.inherit(&shell.chg_tol, policy),
            self.tr_tol.inherit(&shell.tr_tol, policy),
            self.pivot_rel_tol.inherit(&shell.pivot_rel_tol, policy),
            self.pivot_abs_tol.inherit(&shell.pivot_abs_tol, policy),
            self.gmin.inherit(&shell.gmin, policy),
            self.xmu.inherit(&shell.xmu, policy),
            self.trap_ratio.inherit(&shell.trap_ratio, policy),
            self.min_break.inherit(&shell.min_break, policy),
            self.dc_max_iter.inherit(&shell.dc_max_iter, policy),
            self.tran_max_iter.inherit(&shell.tran_max_iter, policy),
            self.max_order.inherit(&shell.max_order, policy),
            self.method.inherit(&shell.method, policy),
            self.load_threads.inherit(&shell.load_threads, policy),
            self.loop_threads.inherit(&shell.loop_threads, policy),
            self.trap_check.inherit(&shell.trap_check, policy),
            self.temperature.inherit(&shell.temperature, policy),
            self.nominal_temperature.inherit(&shell.nominal_temperature, policy),
        ];
        let count = merged.iter().filter(|m| **m).count();
        tracing::trace!(?policy, count, "merged shell options into task");
        count
    }

    /// Check every field against its documented range.
    ///
    /// Values set through [`TaskConfig::set_param`] are always in range;
    /// this catches configs built by hand or deserialized.
    pub fn validate(&self) -> ConfigResult<()> {
        for id in ParamId::ALL {
            if let Some(v) = self.numeric_value(id) {
                id.check_range(v)?;
            }
        }
        if self.max_order.get() > self.method.get().max_order()
            && self.method.is_given()
            && self.max_order.is_given()
        {
            return Err(ConfigError::OutOfRange {
                name: ParamId::MaxOrder.name(),
                value: self.max_order.get() as f64,
            });
        }
        Ok(())
    }

    /// Highest order usable with the selected method.
    pub fn effective_max_order(&self) -> usize {
        self.max_order.get().min(self.method.get().max_order()).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_not_given() {
        let cfg = TaskConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(ParamId::ALL.iter().all(|id| !cfg.is_param_given(*id)));
        assert_eq!(cfg.xmu.get(), 0.5);
        assert_eq!(cfg.trap_ratio.get(), 10.0);
    }

    #[test]
    fn global_merge_overrides_ungiven_fields() {
        let mut task = TaskConfig::default();
        task.rel_tol.set(1e-4);

        let mut shell = TaskConfig::default();
        shell.rel_tol.set(1e-2);
        shell.abs_tol.unset(1e-9);

        let merged = task.merge_shell(&shell, MergePolicy::Global);
        assert_eq!(task.rel_tol.get(), 1e-4);
        assert_eq!(task.abs_tol.get(), 1e-9);
        assert!(!task.abs_tol.is_given());
        assert_eq!(merged, ParamId::ALL.len() - 1);
    }

    #[test]
    fn local_merge_only_copies_given_shell_fields() {
        let mut task = TaskConfig::default();
        task.gmin.set(1e-10);

        let mut shell = TaskConfig::default();
        shell.gmin.set(1e-9);
        shell.trap_check.set(true);
        shell.abs_tol.unset(1e-6);

        let merged = task.merge_shell(&shell, MergePolicy::Local);
        assert_eq!(merged, 1);
        assert!(task.trap_check.get());
        assert_eq!(task.gmin.get(), 1e-10);
        assert_eq!(task.abs_tol.get(), 1e-12);
    }

    #[test]
    fn noshell_merge_changes_nothing() {
        let mut task = TaskConfig::default();
        let mut shell = TaskConfig::default();
        shell.method.set(IntegrationMethod::Gear);
        assert_eq!(task.merge_shell(&shell, MergePolicy::NoShell), 0);
        assert_eq!(task, TaskConfig::default());
    }

    #[test]
    fn effective_max_order_clamps_to_method() {
        let mut cfg = TaskConfig::default();
        cfg.max_order.set(5);
        assert_eq!(cfg.effective_max_order(), 2);
        cfg.method.set(IntegrationMethod::Gear);
        assert_eq!(cfg.effective_max_order(), 5);
    }

    #[test]
    fn validate_catches_hand_built_values() {
        let mut cfg = TaskConfig::default();
        cfg.xmu.set(0.9);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::OutOfRange { name: "xmu", .. })
        ));
    }

    #[test]
    fn serde_keeps_given_flags() {
        let mut cfg = TaskConfig::default();
        cfg.load_threads.set(4);
        let json = serde_json::to_string(&cfg).unwrap();
        let back: TaskConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
        assert!(back.load_threads.is_given());

        let partial: TaskConfig =
            serde_json::from_str(r#"{"gmin": {"value": 1e-9, "given": true}}"#).unwrap();
        assert_eq!(partial.gmin.get(), 1e-9);
        assert_eq!(partial.rel_tol.get(), 1e-3);
    }
}
