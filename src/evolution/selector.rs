//! Fitness-proportional ("roulette-wheel") parent selection
//!
//! [`WeightedSelector::select`] is deterministic given the draw, which keeps the
//! walk itself unit-testable. [`WeightedSelector::sample`] supplies the draw
//! from an RNG and handles the degenerate-fitness fallback.

use crate::evolution::fitness::FitnessSnapshot;
use rand::Rng;

#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedSelector;

impl WeightedSelector {
    pub fn new() -> Self {
        Self
    }

    /// Walk the population subtracting normalised fitness from `draw`
    ///
    /// Returns the first index at which the remainder drops to zero or below.
    /// The result is clamped to `[0, n - 1]` when rounding leaves a positive
    /// remainder after the last agent.
    ///
    /// # Panics
    ///
    /// Panics if the snapshot is empty.
    pub fn select(&self, snapshot: &FitnessSnapshot, draw: f64) -> usize {
        assert!(!snapshot.is_empty(), "Cannot select from an empty snapshot");

        let total = snapshot.total();
        let mut remainder = draw;

        for (index, fitness) in snapshot.values().iter().enumerate() {
            remainder -= fitness / total;
            if remainder <= 0.0 {
                return index;
            }
        }

        snapshot.len() - 1
    }

    /// Draw one index using `rng`
    ///
    /// Degenerate snapshots (total not positive) select uniformly.
    pub fn sample<R: Rng + ?Sized>(&self, snapshot: &FitnessSnapshot, rng: &mut R) -> usize {
        if snapshot.is_degenerate() {
            return rng.gen_range(0..snapshot.len());
        }
        self.select(snapshot, rng.gen::<f64>())
    }

    /// Two independent draws from the same snapshot
    pub fn sample_parents<R: Rng + ?Sized>(
        &self,
        snapshot: &FitnessSnapshot,
        rng: &mut R,
    ) -> (usize, usize) {
        let parent_a = self.sample(snapshot, rng);
        let parent_b = self.sample(snapshot, rng);
        (parent_a, parent_b)
    }
}
