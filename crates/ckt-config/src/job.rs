//! Transient job description.

use crate::error::{ConfigError, ConfigResult};
use crate::setting::Setting;
use serde::{Deserialize, Serialize};

/// Time window and step hints for one transient job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Start of output (s). Integration always begins at 0.
    pub t_start: Setting<f64>,
    /// Final time (s).
    pub t_stop: Setting<f64>,
    /// Suggested output step (s).
    pub t_step: Setting<f64>,
    /// Largest internal step (s); not given means automatic.
    pub t_max: Setting<f64>,
    /// Skip the operating point and start from initial conditions.
    pub uic: Setting<bool>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            t_start: Setting::default_to(0.0),
            t_stop: Setting::default_to(0.0),
            t_step: Setting::default_to(0.0),
            t_max: Setting::default_to(0.0),
            uic: Setting::default_to(false),
        }
    }
}

impl JobConfig {
    pub fn new(t_step: f64, t_stop: f64) -> ConfigResult<Self> {
        let mut job = Self::default();
        job.t_step.set(t_step);
        job.t_stop.set(t_stop);
        job.validate()?;
        Ok(job)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let (start, stop, step) = (self.t_start.get(), self.t_stop.get(), self.t_step.get());
        if !(step.is_finite() && step > 0.0) {
            return Err(ConfigError::InvalidJob {
                what: "t_step must be positive",
            });
        }
        if !(stop.is_finite() && stop > 0.0) {
            return Err(ConfigError::InvalidJob {
                what: "t_stop must be positive",
            });
        }
        if !(start >= 0.0 && start < stop) {
            return Err(ConfigError::InvalidJob {
                what: "t_start must lie in [0, t_stop)",
            });
        }
        if self.t_max.is_given() && !(self.t_max.get() > 0.0) {
            return Err(ConfigError::InvalidJob {
                what: "t_max must be positive",
            });
        }
        Ok(())
    }

    /// Largest internal step: the given `t_max`, otherwise the smaller of
    /// `t_step` and one fiftieth of the simulated window.
    pub fn effective_max_step(&self) -> f64 {
        if self.t_max.is_given() {
            self.t_max.get()
        } else {
            let window = self.t_stop.get() - self.t_start.get();
            self.t_step.get().min(window / 50.0)
        }
    }
}
