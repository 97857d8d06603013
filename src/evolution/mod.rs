//! Fitness-proportionate reproduction

pub mod fitness;
pub mod reproduction;
pub mod selector;

pub use fitness::{FitnessSnapshot, FitnessStats};
pub use reproduction::{ReproductionCoordinator, ReproductionReport};
pub use selector::WeightedSelector;
