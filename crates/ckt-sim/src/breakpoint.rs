//! Forced evaluation points for the transient time-step controller.
//!
//! Two kinds of breakpoint are tracked: explicit one-shot times kept in a
//! sorted vector, and periodic lattices `offset + k * period` (`k >= 0`)
//! whose points are generated on demand rather than stored.

use crate::error::{SimError, SimResult};
use ckt_core::{ensure_finite, ensure_positive};

/// A periodic breakpoint family.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lattice {
    pub offset: f64,
    pub period: f64,
}

impl Lattice {
    /// Earliest lattice point strictly later than `t + min_break`.
    pub fn next_after(&self, t: f64, min_break: f64) -> f64 {
        let floor = t + min_break;
        if self.offset > floor {
            return self.offset;
        }
        // rounding in the quotient can move the index by one either way
        let k = ((floor - self.offset) / self.period).floor();
        for step in 0..3 {
            let candidate = self.offset + (k + step as f64) * self.period;
            if candidate > floor {
                return candidate;
            }
        }
        // period below the f64 resolution at `floor`
        (floor + self.period).max(step_up(floor))
    }
}

/// Smallest f64 strictly greater than finite `x`.
fn step_up(x: f64) -> f64 {
    if x == 0.0 {
        f64::from_bits(1)
    } else if x > 0.0 {
        f64::from_bits(x.to_bits() + 1)
    } else {
        f64::from_bits(x.to_bits() - 1)
    }
}

/// Sorted explicit breakpoints plus lazily generated lattices.
#[derive(Clone, Debug)]
pub struct BreakpointSet {
    explicit: Vec<f64>,
    lattices: Vec<Lattice>,
    next: [f64; 2],
}

impl Default for BreakpointSet {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakpointSet {
    pub fn new() -> Self {
        Self {
            explicit: Vec::new(),
            lattices: Vec::new(),
            next: [f64::INFINITY; 2],
        }
    }

    /// Explicit breakpoints, ascending.
    pub fn explicit(&self) -> &[f64] {
        &self.explicit
    }

    pub fn lattices(&self) -> &[Lattice] {
        &self.lattices
    }

    /// Register a periodic family. Returns `false` for an exact duplicate.
    pub fn set_lattice(&mut self, offset: f64, period: f64) -> SimResult<bool> {
        ensure_finite(offset, "lattice offset")?;
        ensure_positive(period, "lattice period")?;
        let lattice = Lattice { offset, period };
        if self.lattices.contains(&lattice) {
            return Ok(false);
        }
        self.lattices.push(lattice);
        tracing::debug!(offset, period, "registered breakpoint lattice");
        Ok(true)
    }

    /// Insert a one-shot breakpoint at `time`.
    ///
    /// A time within `min_break` of an existing entry merges with it and
    /// the earlier of the two survives. Returns whether a new entry was
    /// added.
    pub fn set_break(&mut self, time: f64, now: f64, min_break: f64) -> SimResult<bool> {
        ensure_finite(time, "breakpoint time")?;
        if time < now {
            return Err(SimError::BreakpointInPast { time, now });
        }

        let pos = self.explicit.partition_point(|&b| b < time);
        let added = if pos > 0 && time - self.explicit[pos - 1] <= min_break {
            tracing::trace!(time, kept = self.explicit[pos - 1], "breakpoint merged");
            false
        } else if pos < self.explicit.len() && self.explicit[pos] - time <= min_break {
            tracing::trace!(time, replaced = self.explicit[pos], "breakpoint merged");
            self.explicit[pos] = time;
            false
        } else {
            self.explicit.insert(pos, time);
            true
        };

        self.refresh(now, min_break);
        Ok(added)
    }

    /// Drop every explicit breakpoint at or before `now`.
    pub fn clear_break(&mut self, now: f64, min_break: f64) {
        let passed = self.explicit.partition_point(|&b| b <= now);
        if passed > 0 {
            self.explicit.drain(..passed);
            tracing::trace!(now, passed, "cleared breakpoints");
        }
        self.refresh(now, min_break);
    }

    /// Earliest breakpoint strictly later than `t + min_break`.
    ///
    /// Explicit entries win over lattice points that fall within
    /// `min_break` of them.
    pub fn next_break(&self, t: f64, min_break: f64) -> Option<f64> {
        let floor = t + min_break;
        let explicit = self
            .explicit
            .get(self.explicit.partition_point(|&b| b <= floor))
            .copied();
        let lattice = self
            .lattices
            .iter()
            .map(|l| l.next_after(t, min_break))
            .min_by(f64::total_cmp);

        match (explicit, lattice) {
            (Some(e), Some(l)) if (e - l).abs() <= min_break => Some(e),
            (Some(e), Some(l)) => Some(e.min(l)),
            (e, l) => e.or(l),
        }
    }

    /// The cached next two breakpoints; `INFINITY` where fewer exist.
    pub fn next_pair(&self) -> [f64; 2] {
        self.next
    }

    fn refresh(&mut self, now: f64, min_break: f64) {
        let first = self.next_break(now, min_break).unwrap_or(f64::INFINITY);
        let second = if first.is_finite() {
            self.next_break(first, min_break).unwrap_or(f64::INFINITY)
        } else {
            f64::INFINITY
        };
        self.next = [first, second];
    }
}
