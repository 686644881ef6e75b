//! State generations and the accepted-solution ring.

/// Number of retained state generations (and solution ring slots).
pub const NUM_STATES: usize = 8;

/// Eight generations of the per-unknown state vector.
///
/// Generation 0 is the timepoint being solved; generation `i` is `i`
/// accepted timepoints back. Only `order + 2` generations carry meaning at
/// any time, but all eight are kept allocated.
#[derive(Clone, Debug)]
pub struct StateHistory {
    gens: [Vec<f64>; NUM_STATES],
    active: usize,
}

impl StateHistory {
    pub fn new(len: usize) -> Self {
        Self {
            gens: std::array::from_fn(|_| vec![0.0; len]),
            active: 3,
        }
    }

    /// Slots per generation.
    pub fn len(&self) -> usize {
        self.gens[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.gens[0].is_empty()
    }

    pub fn resize(&mut self, len: usize) {
        for g in &mut self.gens {
            g.resize(len, 0.0);
        }
    }

    /// Generations in use for the current order.
    pub fn active(&self) -> usize {
        self.active
    }

    pub(crate) fn set_active_for_order(&mut self, order: usize) {
        self.active = (order + 2).min(NUM_STATES);
    }

    /// Generation `index`, or `None` past the last one.
    pub fn generation(&self, index: usize) -> Option<&[f64]> {
        self.gens.get(index).map(Vec::as_slice)
    }

    pub fn current(&self) -> &[f64] {
        &self.gens[0]
    }

    pub fn current_mut(&mut self) -> &mut [f64] {
        &mut self.gens[0]
    }

    /// Generation 0 mutably and generations `1..` shared.
    ///
    /// The shared slice is indexed from generation 1.
    pub fn split_current(&mut self) -> (&mut [f64], &[Vec<f64>]) {
        let (head, tail) = self.gens.split_at_mut(1);
        (&mut head[0], tail)
    }

    /// Accept the current generation: every generation moves one back and
    /// the new generation 0 starts as a copy of the accepted values.
    pub fn rotate(&mut self) {
        self.gens.rotate_right(1);
        let (head, tail) = self.gens.split_at_mut(1);
        head[0].copy_from_slice(&tail[0]);
    }

    /// Copy generation 0 into every older generation.
    pub fn fill_history(&mut self) {
        let (head, tail) = self.gens.split_at_mut(1);
        for g in tail {
            g.copy_from_slice(&head[0]);
        }
    }
}

/// Ring of accepted solutions with their timepoints, newest first.
#[derive(Clone, Debug)]
pub struct SolutionRing {
    slots: [Vec<f64>; NUM_STATES],
    times: [f64; NUM_STATES],
    filled: usize,
}

impl SolutionRing {
    /// Ring for vectors of `len` entries (including ground).
    pub fn new(len: usize) -> Self {
        Self {
            slots: std::array::from_fn(|_| vec![0.0; len]),
            times: [0.0; NUM_STATES],
            filled: 0,
        }
    }

    /// Number of valid entries.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn clear(&mut self) {
        self.filled = 0;
    }

    pub fn resize(&mut self, len: usize) {
        for s in &mut self.slots {
            s.resize(len, 0.0);
        }
        self.filled = 0;
    }

    /// Store `solution` at `time` as the newest entry.
    pub fn push(&mut self, time: f64, solution: &[f64]) {
        self.slots.rotate_right(1);
        self.times.rotate_right(1);
        let n = self.slots[0].len().min(solution.len());
        self.slots[0][..n].copy_from_slice(&solution[..n]);
        self.times[0] = time;
        self.filled = (self.filled + 1).min(NUM_STATES);
    }

    /// Entry `index` back from the newest.
    pub fn get(&self, index: usize) -> Option<(f64, &[f64])> {
        (index < self.filled).then(|| (self.times[index], self.slots[index].as_slice()))
    }

    pub fn time(&self, index: usize) -> Option<f64> {
        (index < self.filled).then(|| self.times[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_moves_generations_back() {
        let mut h = StateHistory::new(2);
        h.current_mut().copy_from_slice(&[1.0, 2.0]);
        h.rotate();
        h.current_mut().copy_from_slice(&[3.0, 4.0]);
        h.rotate();

        assert_eq!(h.generation(1), Some(&[3.0, 4.0][..]));
        assert_eq!(h.generation(2), Some(&[1.0, 2.0][..]));
        // new current starts from the accepted values
        assert_eq!(h.current(), &[3.0, 4.0]);
        assert_eq!(h.generation(NUM_STATES), None);
    }

    #[test]
    fn active_count_tracks_order() {
        let mut h = StateHistory::new(1);
        h.set_active_for_order(1);
        assert_eq!(h.active(), 3);
        h.set_active_for_order(6);
        assert_eq!(h.active(), NUM_STATES);
    }

    #[test]
    fn split_current_indexes_from_generation_one() {
        let mut h = StateHistory::new(1);
        h.current_mut()[0] = 5.0;
        h.rotate();
        let (cur, older) = h.split_current();
        cur[0] = 6.0;
        assert_eq!(older[0][0], 5.0);
        assert_eq!(older.len(), NUM_STATES - 1);
    }

    #[test]
    fn ring_keeps_newest_first_and_caps() {
        let mut r = SolutionRing::new(2);
        for k in 0..10 {
            r.push(k as f64, &[0.0, k as f64]);
        }
        assert_eq!(r.len(), NUM_STATES);
        assert_eq!(r.get(0), Some((9.0, &[0.0, 9.0][..])));
        assert_eq!(r.time(7), Some(2.0));
        assert_eq!(r.get(8), None);
    }
}
