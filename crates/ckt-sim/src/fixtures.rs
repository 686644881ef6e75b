//! Linear elements for tests and benchmarks.
//!
//! Resistors, capacitors and current sources with ideal stamps. They are
//! fixtures for exercising the loader and integrator, not device models.

use crate::companion::Companion;
use crate::context::SimContext;
use crate::device::{Device, DeviceContext, EntryId, MatrixPattern, StampSink, StateAllocator};
use crate::error::SimResult;
use crate::load::DeviceTable;
use crate::newton::ni_iter;
use crate::state::{Analysis, CircuitState};
use ckt_solver::{LoadError, MatrixHandle};

fn two_terminal(pattern: &mut MatrixPattern, a: usize, b: usize) -> [Option<EntryId>; 4] {
    [
        pattern.entry(a, a),
        pattern.entry(a, b),
        pattern.entry(b, a),
        pattern.entry(b, b),
    ]
}

fn stamp_conductance(sink: &StampSink<'_>, entries: &[Option<EntryId>; 4], g: f64) {
    sink.add_matrix(entries[0], g);
    sink.add_matrix(entries[1], -g);
    sink.add_matrix(entries[2], -g);
    sink.add_matrix(entries[3], g);
}

pub enum Element {
    Resistor {
        a: usize,
        b: usize,
        ohms: f64,
        entries: [Option<EntryId>; 4],
    },
    Capacitor {
        a: usize,
        b: usize,
        farads: f64,
        q: usize,
        entries: [Option<EntryId>; 4],
    },
    /// Current flowing from `b` through the source into `a`.
    Current { a: usize, b: usize, amps: f64 },
}

impl Element {
    pub fn resistor(a: usize, b: usize, ohms: f64) -> Self {
        Element::Resistor {
            a,
            b,
            ohms,
            entries: [None; 4],
        }
    }

    pub fn capacitor(a: usize, b: usize, farads: f64) -> Self {
        Element::Capacitor {
            a,
            b,
            farads,
            q: 0,
            entries: [None; 4],
        }
    }

    pub fn current(a: usize, b: usize, amps: f64) -> Self {
        Element::Current { a, b, amps }
    }

    /// Charge slot of a capacitor.
    pub fn charge_slot(&self) -> Option<usize> {
        match self {
            Element::Capacitor { q, .. } => Some(*q),
            _ => None,
        }
    }
}

impl Device for Element {
    fn name(&self) -> &str {
        match self {
            Element::Resistor { .. } => "resistor",
            Element::Capacitor { .. } => "capacitor",
            Element::Current { .. } => "current",
        }
    }

    fn setup(&mut self, pattern: &mut MatrixPattern, states: &mut StateAllocator) {
        match self {
            Element::Resistor { a, b, entries, .. } => *entries = two_terminal(pattern, *a, *b),
            Element::Capacitor {
                a, b, q, entries, ..
            } => {
                *entries = two_terminal(pattern, *a, *b);
                *q = states.alloc(2).start;
            }
            Element::Current { .. } => {}
        }
    }

    fn load(
        &self,
        ctx: &DeviceContext<'_>,
        companion: &mut Companion<'_>,
        sink: &StampSink<'_>,
    ) -> Result<(), LoadError> {
        match self {
            Element::Resistor {
                ohms, entries, ..
            } => stamp_conductance(sink, entries, 1.0 / ohms),
            Element::Capacitor {
                a,
                b,
                farads,
                q,
                entries,
            } => {
                let v = ctx.voltage(*a) - ctx.voltage(*b);
                companion.set_current(*q, farads * v);
                if ctx.mode.analysis == Analysis::Tran {
                    let out = companion.integrate(*farads, *q)?;
                    stamp_conductance(sink, entries, out.geq);
                    sink.add_rhs(*a, -out.ceq);
                    sink.add_rhs(*b, out.ceq);
                }
            }
            Element::Current { a, b, amps } => {
                sink.add_rhs(*a, *amps);
                sink.add_rhs(*b, -*amps);
            }
        }
        Ok(())
    }
}

/// Shunt RC ladder driven by a 1 mA step into node 1: every node has
/// 10 kOhm and 1 nF to ground, neighbours are joined by 100 Ohm.
pub fn rc_ladder(nodes: usize) -> DeviceTable<Element> {
    let mut parts = vec![Element::current(1, 0, 1e-3)];
    for n in 1..=nodes {
        parts.push(Element::resistor(n, 0, 10e3));
        parts.push(Element::capacitor(n, 0, 1e-9));
        if n < nodes {
            parts.push(Element::resistor(n, n + 1, 100.0));
        }
    }
    DeviceTable::setup(parts, nodes)
}

/// Advance one timepoint of `delta` and iterate it to convergence.
///
/// Returns the Newton iterations spent.
pub fn step<M: MatrixHandle>(
    ctx: &mut SimContext,
    state: &mut CircuitState,
    table: &mut DeviceTable<Element>,
    matrix: &mut M,
    delta: f64,
) -> SimResult<usize> {
    state.advance(delta)?;
    state.compute_coefficients()?;
    let limit = state.iteration_limit();
    let out = ni_iter(ctx, state, table, matrix, limit)?;
    state.accept_timepoint();
    Ok(out.iterations)
}
