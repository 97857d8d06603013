//! Point-in-time fitness snapshots
//!
//! A [`FitnessSnapshot`] is captured once at the start of a reproduction round
//! and shared read-only by every selection draw of that round, so parent
//! selection never sees a sibling's crossover in flight.

use crate::runtime::agent::Agent;
use crate::runtime::dispatcher::{TaskFailure, TaskPhase};
use crate::runtime::population::Population;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};

/// Immutable index → fitness mapping with a precomputed total
#[derive(Debug, Clone, PartialEq)]
pub struct FitnessSnapshot {
    values: Vec<f64>,
    total: f64,
}

impl FitnessSnapshot {
    /// Read `fitness()` of every agent exactly once
    ///
    /// An agent whose `fitness()` panics gets weight 0 and a failure record.
    pub fn capture<A: Agent>(population: &Population<A>) -> (Self, Vec<TaskFailure>) {
        let mut failures = Vec::new();
        let values = population
            .agents()
            .iter()
            .enumerate()
            .map(
                |(index, agent)| match panic::catch_unwind(AssertUnwindSafe(|| agent.fitness())) {
                    Ok(value) => value,
                    Err(payload) => {
                        failures.push(TaskFailure::from_panic(index, TaskPhase::Fitness, payload));
                        0.0
                    }
                },
            )
            .collect();

        (Self::from_values(values), failures)
    }

    pub fn from_values(values: Vec<f64>) -> Self {
        let total = values.iter().sum();
        Self { values, total }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// No positive fitness to weight by: selection falls back to uniform draws
    pub fn is_degenerate(&self) -> bool {
        !self.total.is_finite() || self.total <= 0.0
    }

    pub fn stats(&self) -> FitnessStats {
        FitnessStats::from_values(&self.values)
    }
}

/// Summary statistics over a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl FitnessStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                mean: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }

        let total: f64 = values.iter().sum();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            mean: total / values.len() as f64,
            min,
            max,
        }
    }
}
