//! Companion-model charge integration.
//!
//! A reactive element keeps its charge (or flux) at state slot `q` and the
//! matching current at `q + 1`. Integrating the charge turns the element
//! into a conductance `geq` in parallel with a current source `ceq`.
//!
//! [`Companion`] is a view over the coefficients and the state generations.
//! Device load workers each get one bound to their own slice of
//! generation 0, so the whole-circuit API and the threaded loader run the
//! same arithmetic.

use crate::coeffs::IntegCoeffs;
use crate::error::{SimError, SimResult};
use ckt_config::IntegrationMethod;

/// Currents below this are never checked for ringing.
pub const TRAP_CURRENT_FLOOR: f64 = 1e-6;
/// Charges below this are never checked for ringing.
pub const TRAP_CHARGE_FLOOR: f64 = 1e-16;

/// Step-level inputs shared by every companion view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompanionParams {
    pub delta: f64,
    pub trap_ratio: f64,
    pub trap_check: bool,
}

/// Result of [`Companion::integrate`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Integrated {
    /// Equivalent conductance `ag[0] * cap`.
    pub geq: f64,
    /// Equivalent current excluding the `geq * v` term.
    pub ceq: f64,
    /// Trapezoidal ringing was detected at this slot.
    pub oscillating: bool,
}

pub struct Companion<'a> {
    coeffs: &'a IntegCoeffs,
    params: CompanionParams,
    base: usize,
    current: &'a mut [f64],
    older: &'a [Vec<f64>],
}

impl<'a> Companion<'a> {
    /// View over `current`, the part of generation 0 starting at global
    /// slot `base`, and the full older generations (indexed from 1).
    pub fn new(
        coeffs: &'a IntegCoeffs,
        params: CompanionParams,
        base: usize,
        current: &'a mut [f64],
        older: &'a [Vec<f64>],
    ) -> Self {
        Self {
            coeffs,
            params,
            base,
            current,
            older,
        }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn params(&self) -> &CompanionParams {
        &self.params
    }

    /// Value of global slot `slot` in generation 0.
    pub fn current(&self, slot: usize) -> f64 {
        self.current[slot - self.base]
    }

    pub fn set_current(&mut self, slot: usize, value: f64) {
        self.current[slot - self.base] = value;
    }

    /// Value of global slot `slot` in generation `generation`.
    pub fn state(&self, generation: usize, slot: usize) -> f64 {
        match generation {
            0 => self.current(slot),
            g => self.older[g - 1][slot],
        }
    }

    fn fresh(&self) -> SimResult<&'a IntegCoeffs> {
        if self.coeffs.is_stale() {
            return Err(SimError::CoeffsStale);
        }
        Ok(self.coeffs)
    }

    /// Companion constant for the charge at `q` without re-evaluating the
    /// device.
    pub fn find_ceq(&self, q: usize) -> SimResult<f64> {
        let coeffs = self.fresh()?;
        let ag = coeffs.ag();
        let ceq = match (coeffs.method(), coeffs.order()) {
            (IntegrationMethod::Trapezoidal, 1) => ag[1] * self.state(1, q),
            (IntegrationMethod::Trapezoidal, _) => {
                let r = ag[1] / (ag[0] - ag[1]);
                -ag[0] * self.state(1, q) - r * self.state(1, q + 1)
            }
            (IntegrationMethod::Gear, order) => (1..=order)
                .map(|i| ag[i] * self.state(i, q))
                .sum(),
        };
        Ok(ceq)
    }

    /// Integrate the charge at `q` with capacitance `cap`.
    ///
    /// Writes the resulting current into slot `q + 1` of generation 0.
    pub fn integrate(&mut self, cap: f64, q: usize) -> SimResult<Integrated> {
        let ceq = self.find_ceq(q)?;
        let ag0 = self.coeffs.ag()[0];
        let ccap = ag0 * self.current(q) + ceq;
        self.set_current(q + 1, ccap);

        let oscillating = self.params.trap_check
            && self.coeffs.method() == IntegrationMethod::Trapezoidal
            && self.coeffs.order() == 2
            && self.trap_check(q)?;

        Ok(Integrated {
            geq: ag0 * cap,
            ceq,
            oscillating,
        })
    }

    /// Detect trapezoidal ringing at charge slot `q`.
    pub fn trap_check(&self, q: usize) -> SimResult<bool> {
        self.fresh()?;
        let c0 = self.current(q + 1);
        let q0 = self.current(q);
        if c0.abs() < TRAP_CURRENT_FLOOR || q0.abs() < TRAP_CHARGE_FLOOR {
            return Ok(false);
        }
        let c1 = self.state(1, q + 1);
        let c2 = self.state(2, q + 1);
        let q1 = self.state(1, q);
        let ratio = self.params.trap_ratio;

        let flagged = c1.abs() > ratio * (q0 - q1).abs() / self.params.delta
            && (c0 - c1).abs() > ratio * (c0 - c2).abs();
        if flagged {
            tracing::debug!(slot = q, c0, c1, c2, "trapezoidal ringing detected");
        }
        Ok(flagged)
    }
}
