//! Implicit integration coefficients.
//!
//! `ag[i]` weights state generation `i` in the discretized time derivative
//! `dq/dt ~ ag[0]*q0 + ...`. Trapezoidal coefficients are closed form; Gear
//! coefficients come from a small LU solve over the step history.

use crate::error::{SimError, SimResult};
use ckt_config::IntegrationMethod;
use ckt_core::{ensure_all_positive, ensure_positive};
use nalgebra::{DMatrix, DVector};

/// Highest supported integration order.
pub const MAX_ORDER: usize = 6;

/// Coefficients together with the method, order and step they belong to.
#[derive(Clone, Debug)]
pub struct IntegCoeffs {
    ag: [f64; MAX_ORDER + 1],
    method: IntegrationMethod,
    order: usize,
    xmu: f64,
    delta: f64,
    stale: bool,
}

impl Default for IntegCoeffs {
    fn default() -> Self {
        Self {
            ag: [0.0; MAX_ORDER + 1],
            method: IntegrationMethod::default(),
            order: 1,
            xmu: 0.5,
            delta: 0.0,
            stale: true,
        }
    }
}

impl IntegCoeffs {
    pub fn ag(&self) -> &[f64; MAX_ORDER + 1] {
        &self.ag
    }

    pub fn method(&self) -> IntegrationMethod {
        self.method
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn xmu(&self) -> f64 {
        self.xmu
    }

    /// The step the coefficients were computed for.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Recompute for the given step history.
    ///
    /// `delta_old[0]` is the current step; `delta_old[i]` the step `i`
    /// timepoints back. On error nothing is modified.
    pub fn compute(
        &mut self,
        method: IntegrationMethod,
        order: usize,
        xmu: f64,
        delta: f64,
        delta_old: &[f64],
    ) -> SimResult<()> {
        let ag = compute_ag(method, order, xmu, delta, delta_old)?;
        self.ag = ag;
        self.method = method;
        self.order = order;
        self.xmu = xmu;
        self.delta = delta;
        self.stale = false;
        tracing::trace!(%method, order, delta, ag0 = ag[0], "integration coefficients");
        Ok(())
    }
}

/// Check `order` against the method's limit.
pub fn check_order(method: IntegrationMethod, order: usize) -> SimResult<()> {
    let max = method.max_order();
    if order == 0 || order > max {
        return Err(SimError::Order {
            order,
            max,
            method,
        });
    }
    Ok(())
}

/// Compute `ag[0..=order]`; unused slots are zero.
pub fn compute_ag(
    method: IntegrationMethod,
    order: usize,
    xmu: f64,
    delta: f64,
    delta_old: &[f64],
) -> SimResult<[f64; MAX_ORDER + 1]> {
    check_order(method, order)?;
    ensure_positive(delta, "delta")?;

    let mut ag = [0.0; MAX_ORDER + 1];
    match method {
        IntegrationMethod::Trapezoidal => match order {
            1 => {
                ag[0] = 1.0 / delta;
                ag[1] = -ag[0];
            }
            _ => {
                if !(0.0..=0.5).contains(&xmu) {
                    return Err(SimError::InvalidArg {
                        what: "xmu must lie in [0, 0.5]",
                    });
                }
                ag[0] = 1.0 / ((1.0 - xmu) * delta);
                ag[1] = ag[0] * xmu;
            }
        },
        IntegrationMethod::Gear => {
            let history = delta_old.get(..order).ok_or(SimError::InvalidStep {
                what: "step history shorter than the order",
            })?;
            ensure_all_positive(history, "Gear step history")?;
            let (mat, rhs) = gear_system(order, delta, delta_old);
            let sol = mat.lu().solve(&rhs).ok_or(SimError::InvalidStep {
                what: "degenerate Gear step history",
            })?;
            for (slot, v) in ag.iter_mut().zip(sol.iter()) {
                *slot = *v;
            }
        }
    }
    Ok(ag)
}

/// The normalized `(order+1)` square Gear system.
///
/// Row 0 enforces that the weights sum to zero; row `j` that the weighted
/// history reproduces `d/dt` of `t^j` at the new timepoint.
pub(crate) fn gear_system(
    order: usize,
    delta: f64,
    delta_old: &[f64],
) -> (DMatrix<f64>, DVector<f64>) {
    let n = order + 1;
    let mut mat = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        mat[(0, i)] = 1.0;
    }
    let mut span = 0.0;
    for i in 1..n {
        span += delta_old[i - 1];
        let ratio = span / delta;
        let mut power = 1.0;
        for j in 1..n {
            power *= ratio;
            mat[(j, i)] = power;
        }
    }
    let mut rhs = DVector::<f64>::zeros(n);
    rhs[1] = -1.0 / delta;
    (mat, rhs)
}
