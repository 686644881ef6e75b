//! Threaded device load.
//!
//! Devices are split into `threads` contiguous chunks and loaded on the
//! context's rayon pool. Every device gets exclusive access to its own
//! slice of state generation 0; matrix and RHS stamps go through shared
//! atomic accumulators and are flushed into the matrix once all devices
//! are done.

use crate::coeffs::IntegCoeffs;
use crate::companion::{Companion, CompanionParams};
use crate::device::{Device, DeviceContext, MatrixPattern, StampSink, StateAllocator};
use crate::error::LOADER_ERROR;
use crate::history::StateHistory;
use crate::state::Mode;
use ckt_core::{AccumulatingTimer, SharedAccumulator, Timer};
use ckt_solver::{LoadCallback, LoadError, MatrixHandle, RhsBuffers};
use rayon::ThreadPool;
use rayon::prelude::*;
use std::ops::Range;
use std::sync::atomic::AtomicUsize;

/// Devices with their registered pattern and state slots.
#[derive(Debug)]
pub struct DeviceTable<D> {
    devices: Vec<D>,
    ranges: Vec<Range<usize>>,
    pattern: MatrixPattern,
    num_states: usize,
    matrix_acc: SharedAccumulator,
    rhs_acc: SharedAccumulator,
}

impl<D: Device> DeviceTable<D> {
    /// Run setup on every device for a circuit of `size` unknowns.
    pub fn setup(mut devices: Vec<D>, size: usize) -> Self {
        let mut pattern = MatrixPattern::new(size);
        let mut alloc = StateAllocator::default();
        let ranges = devices
            .iter_mut()
            .map(|d| {
                let start = alloc.allocated();
                d.setup(&mut pattern, &mut alloc);
                start..alloc.allocated()
            })
            .collect();
        let num_states = alloc.allocated();
        tracing::debug!(
            devices = devices.len(),
            entries = pattern.len(),
            num_states,
            "device setup complete"
        );
        Self {
            devices,
            ranges,
            matrix_acc: SharedAccumulator::new(pattern.len()),
            rhs_acc: SharedAccumulator::new(size + 1),
            pattern,
            num_states,
        }
    }

    pub fn devices(&self) -> &[D] {
        &self.devices
    }

    /// State slots claimed by each device, in device order.
    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn pattern(&self) -> &MatrixPattern {
        &self.pattern
    }

    /// Total state slots per generation.
    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Per-iteration inputs every device sees.
#[derive(Clone, Copy, Debug)]
pub struct LoadInputs {
    pub params: CompanionParams,
    pub mode: Mode,
    pub time: f64,
    pub gmin: f64,
}

struct Job<'s, D> {
    device: &'s D,
    base: usize,
    slots: &'s mut [f64],
}

/// [`LoadCallback`] that loads a [`DeviceTable`].
pub struct CircuitLoader<'a, D> {
    table: &'a mut DeviceTable<D>,
    states: &'a mut StateHistory,
    coeffs: &'a IntegCoeffs,
    inputs: LoadInputs,
    pool: Option<&'a ThreadPool>,
    threads: usize,
    load_time: Option<&'a AccumulatingTimer>,
    noncon: usize,
    failed_device: Option<String>,
}

impl<'a, D: Device> CircuitLoader<'a, D> {
    pub fn new(
        table: &'a mut DeviceTable<D>,
        states: &'a mut StateHistory,
        coeffs: &'a IntegCoeffs,
        inputs: LoadInputs,
    ) -> Self {
        Self {
            table,
            states,
            coeffs,
            inputs,
            pool: None,
            threads: 0,
            load_time: None,
            noncon: 0,
            failed_device: None,
        }
    }

    /// Load on `pool` split into `threads` chunks.
    pub fn with_pool(mut self, pool: Option<&'a ThreadPool>, threads: usize) -> Self {
        self.pool = pool;
        self.threads = threads;
        self
    }

    pub fn with_timer(mut self, timer: &'a AccumulatingTimer) -> Self {
        self.load_time = Some(timer);
        self
    }

    /// Devices that flagged nonconvergence, summed over every load.
    pub fn noncon(&self) -> usize {
        self.noncon
    }

    /// Name of the device whose load failed last.
    pub fn take_failed_device(&mut self) -> Option<String> {
        self.failed_device.take()
    }

    fn load_devices(&mut self, solution: &[f64]) -> Result<usize, (Option<String>, LoadError)> {
        self.table.matrix_acc.reset();
        self.table.rhs_acc.reset();
        let table = &*self.table;

        let (current, older) = self.states.split_current();
        if current.len() < table.num_states {
            return Err((
                None,
                LoadError::new(
                    LOADER_ERROR,
                    format!(
                        "state vector holds {} slots, devices claimed {}",
                        current.len(),
                        table.num_states
                    ),
                ),
            ));
        }

        let mut jobs = Vec::with_capacity(table.devices.len());
        let mut rest = current;
        let mut offset = 0;
        for (device, range) in table.devices.iter().zip(&table.ranges) {
            let (_, tail) = std::mem::take(&mut rest).split_at_mut(range.start - offset);
            let (slots, tail) = tail.split_at_mut(range.len());
            rest = tail;
            offset = range.end;
            jobs.push(Job {
                device,
                base: range.start,
                slots,
            });
        }

        let noncon = AtomicUsize::new(0);
        let sink = StampSink::new(&table.matrix_acc, &table.rhs_acc, &noncon);
        let ctx = DeviceContext {
            solution,
            mode: self.inputs.mode,
            time: self.inputs.time,
            gmin: self.inputs.gmin,
        };
        let coeffs = self.coeffs;
        let params = self.inputs.params;

        let run = |job: &mut Job<'_, D>| -> Result<(), (Option<String>, LoadError)> {
            let mut companion = Companion::new(coeffs, params, job.base, &mut *job.slots, older);
            job.device
                .load(&ctx, &mut companion, &sink)
                .map_err(|e| (Some(job.device.name().to_string()), e))
        };

        match self.pool {
            Some(pool) if self.threads > 0 && !jobs.is_empty() => {
                let chunk = jobs.len().div_ceil(self.threads);
                pool.install(|| {
                    jobs.par_chunks_mut(chunk)
                        .try_for_each(|chunk| chunk.iter_mut().try_for_each(&run))
                })?;
            }
            _ => jobs.iter_mut().try_for_each(&run)?,
        }

        Ok(noncon.into_inner())
    }

    fn flush(&self, matrix: &mut dyn MatrixHandle, buffers: &mut RhsBuffers) {
        for (i, &(row, col)) in self.table.pattern.entries().iter().enumerate() {
            matrix.add(row, col, self.table.matrix_acc.get(i));
        }
        for (slot, value) in buffers
            .rhs
            .iter_mut()
            .zip(self.table.rhs_acc.values())
            .skip(1)
        {
            *slot += value;
        }
    }
}

impl<D: Device> LoadCallback for CircuitLoader<'_, D> {
    fn load(
        &mut self,
        matrix: &mut dyn MatrixHandle,
        buffers: &mut RhsBuffers,
    ) -> Result<(), LoadError> {
        let timer = Timer::start("device_load");
        let result = self.load_devices(&buffers.rhs_old);
        if let Some(acc) = self.load_time {
            timer.stop_into(acc);
        }

        match result {
            Ok(noncon) => {
                self.noncon += noncon;
                self.flush(matrix, buffers);
                Ok(())
            }
            Err((device, e)) => {
                tracing::warn!(device = ?device, error = %e, "device load failed");
                self.failed_device = device;
                Err(e)
            }
        }
    }

    fn resetup(&mut self, matrix: &mut dyn MatrixHandle) -> Result<(), LoadError> {
        if matrix.size() != self.table.pattern.size() {
            return Err(LoadError::new(
                LOADER_ERROR,
                format!(
                    "matrix resized to {}, devices were set up for {}",
                    matrix.size(),
                    self.table.pattern.size()
                ),
            ));
        }
        Ok(())
    }
}
