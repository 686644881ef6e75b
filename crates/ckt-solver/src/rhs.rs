//! Right-hand-side buffer set.

use ckt_core::GROUND;

/// Primary, previous-iterate and spare RHS vectors, real and imaginary.
///
/// Every vector is `size + 1` long; slot 0 belongs to ground. After a
/// successful solve the driver leaves the newest solution in `rhs_old`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RhsBuffers {
    pub rhs: Vec<f64>,
    pub rhs_old: Vec<f64>,
    pub rhs_spare: Vec<f64>,
    pub irhs: Vec<f64>,
    pub irhs_old: Vec<f64>,
    pub irhs_spare: Vec<f64>,
}

impl RhsBuffers {
    /// Buffers for `size` unknowns.
    pub fn new(size: usize) -> Self {
        let zeros = vec![0.0; size + 1];
        Self {
            rhs: zeros.clone(),
            rhs_old: zeros.clone(),
            rhs_spare: zeros.clone(),
            irhs: zeros.clone(),
            irhs_old: zeros.clone(),
            irhs_spare: zeros,
        }
    }

    /// Number of unknowns, ground excluded.
    pub fn size(&self) -> usize {
        self.rhs.len().saturating_sub(1)
    }

    pub fn resize(&mut self, size: usize) {
        for v in self.all_mut() {
            v.clear();
            v.resize(size + 1, 0.0);
        }
    }

    /// Zero the primary vectors before a load.
    pub fn clear_rhs(&mut self) {
        self.rhs.fill(0.0);
        self.irhs.fill(0.0);
    }

    /// Exchange primary and spare vectors (real and imaginary).
    pub fn swap_spare(&mut self) {
        std::mem::swap(&mut self.rhs, &mut self.rhs_spare);
        std::mem::swap(&mut self.irhs, &mut self.irhs_spare);
    }

    /// Exchange primary and previous-iterate vectors (real and imaginary).
    pub fn swap_old(&mut self) {
        std::mem::swap(&mut self.rhs, &mut self.rhs_old);
        std::mem::swap(&mut self.irhs, &mut self.irhs_old);
    }

    /// Force the ground slot of the solution, RHS and old-RHS vectors to 0.
    pub fn zero_ground(&mut self) {
        for v in [
            &mut self.rhs,
            &mut self.rhs_old,
            &mut self.irhs,
            &mut self.irhs_old,
        ] {
            if let Some(g) = v.get_mut(GROUND) {
                *g = 0.0;
            }
        }
    }

    /// Latest solution (valid after a driver solve).
    pub fn solution(&self) -> &[f64] {
        &self.rhs_old
    }

    pub fn imag_solution(&self) -> &[f64] {
        &self.irhs_old
    }

    fn all_mut(&mut self) -> [&mut Vec<f64>; 6] {
        [
            &mut self.rhs,
            &mut self.rhs_old,
            &mut self.rhs_spare,
            &mut self.irhs,
            &mut self.irhs_old,
            &mut self.irhs_spare,
        ]
    }
}
