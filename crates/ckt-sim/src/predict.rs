//! Polynomial predictor and output interpolation over accepted solutions.

use crate::error::{SimError, SimResult};
use crate::history::SolutionRing;
use ckt_core::ensure_all_positive;

/// Most solutions combined by the predictor or the interpolator.
pub const MAX_POINTS: usize = 4;

/// Lagrange basis weights at `target` for distinct nodes `nodes`.
pub fn lagrange_weights(nodes: &[f64], target: f64, out: &mut [f64]) {
    for (i, w) in out.iter_mut().enumerate().take(nodes.len()) {
        *w = nodes
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, tj)| (target - tj) / (nodes[i] - tj))
            .product();
    }
}

/// Predictor weights for the new timepoint.
///
/// Uses `min(order, 3) + 1` accepted solutions, fewer when the ring holds
/// fewer. Returns the weights and how many are meaningful.
pub fn predictor_weights(
    order: usize,
    delta_old: &[f64],
    available: usize,
) -> SimResult<([f64; MAX_POINTS], usize)> {
    let count = (order.min(MAX_POINTS - 1) + 1).min(available);
    if count == 0 {
        return Err(SimError::InvalidArg {
            what: "no accepted solution to predict from",
        });
    }
    let history = delta_old.get(..count).ok_or(SimError::InvalidStep {
        what: "step history shorter than the predictor",
    })?;
    ensure_all_positive(history, "predictor step history")?;
    let scale = history[0];

    // node i sits at -(delta_old[0] + ... + delta_old[i]) relative to the
    // new timepoint, normalized by the current step
    let mut nodes = [0.0; MAX_POINTS];
    let mut span = 0.0;
    for (i, node) in nodes.iter_mut().enumerate().take(count) {
        span += delta_old[i];
        *node = -span / scale;
    }
    let mut weights = [0.0; MAX_POINTS];
    lagrange_weights(&nodes[..count], 0.0, &mut weights);
    Ok((weights, count))
}

/// Interpolation weights at `t` over the newest entries of `ring`.
pub fn interpolation_weights(ring: &SolutionRing, t: f64) -> SimResult<([f64; MAX_POINTS], usize)> {
    let count = ring.len().min(MAX_POINTS);
    if count == 0 {
        return Err(SimError::InvalidArg {
            what: "no accepted solution to interpolate",
        });
    }
    let mut nodes = [0.0; MAX_POINTS];
    for (i, node) in nodes.iter_mut().enumerate().take(count) {
        *node = ring.time(i).unwrap_or_default();
    }
    let origin = nodes[0];
    let scale = (nodes[0] - nodes[count - 1]).abs();
    let scale = if scale > 0.0 { scale } else { 1.0 };
    for node in nodes.iter_mut().take(count) {
        *node = (*node - origin) / scale;
    }
    if nodes[..count].windows(2).any(|w| w[0] <= w[1]) {
        return Err(SimError::InvalidStep {
            what: "accepted timepoints must be strictly decreasing",
        });
    }
    let mut weights = [0.0; MAX_POINTS];
    lagrange_weights(&nodes[..count], (t - origin) / scale, &mut weights);
    Ok((weights, count))
}

/// `out = sum(weights[i] * ring[i])`.
pub fn combine(ring: &SolutionRing, weights: &[f64], out: &mut [f64]) {
    out.iter_mut().for_each(|v| *v = 0.0);
    for (i, w) in weights.iter().enumerate() {
        if let Some((_, sol)) = ring.get(i) {
            for (o, s) in out.iter_mut().zip(sol) {
                *o += w * s;
            }
        }
    }
}
